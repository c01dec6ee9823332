use crate::scan::{Scan, ScanNotice};
use crate::store::StoredScan;
use std::fmt::Write;

const TITLE: &str = "Space Safety Scanner";

const FOCUS_SCRIPT: &str = r#"<script>
window.addEventListener("focus", () => { fetch("/events/focus", { method: "POST" }); });
</script>"#;

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn layout(body: &str, refetch_on_focus: bool) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n<nav><a href=\"/\">Scan</a> | <a href=\"/history\">History</a></nav>\n{body}\n{script}</body>\n</html>\n",
        title = TITLE,
        body = body,
        script = if refetch_on_focus { FOCUS_SCRIPT } else { "" },
    )
}

fn upload_form() -> &'static str {
    r#"<form action="/scan" method="post" enctype="multipart/form-data">
<label>Select image <input type="file" name="image" accept=".png,.jpg,.jpeg"></label>
<button type="submit">Send to server</button>
</form>"#
}

pub fn index_page(demo: bool, refetch_on_focus: bool) -> String {
    let mut body = String::from(
        "<p>Upload an image to scan for safety objects. (If BACKEND_URL is unset, a demo/dummy result will be shown.)</p>\n",
    );
    if demo {
        body.push_str("<p class=\"info\">No backend URL set, scans show demo results.</p>\n");
    }
    body.push_str(upload_form());
    layout(&body, refetch_on_focus)
}

pub fn scan_page(scan: &Scan, refetch_on_focus: bool) -> String {
    let mut body = String::new();
    let _ = writeln!(
        body,
        "<h2>Preview</h2>\n<img class=\"preview\" src=\"/scans/{key}/original.png\" width=\"{w}\" height=\"{h}\" alt=\"uploaded image\">",
        key = scan.key,
        w = scan.width,
        h = scan.height
    );

    match &scan.notice {
        Some(ScanNotice::BackendError(message)) => {
            let _ = writeln!(
                body,
                "<p class=\"error\">Backend error: {}</p>",
                escape(message)
            );
        }
        Some(ScanNotice::TransportError(message)) => {
            let _ = writeln!(
                body,
                "<p class=\"error\">Error calling backend: {}</p>",
                escape(message)
            );
        }
        Some(ScanNotice::Demo) => {
            body.push_str(
                "<p class=\"warning\">No BACKEND_URL set, showing demo detection (not real).</p>\n",
            );
        }
        None => {}
    }

    let failed = scan.notice.as_ref().is_some_and(ScanNotice::is_failure);
    if !failed {
        let _ = writeln!(
            body,
            "<img class=\"annotated\" src=\"/scans/{key}/annotated.png\" width=\"{w}\" height=\"{h}\" alt=\"annotated image\">",
            key = scan.key,
            w = scan.width,
            h = scan.height
        );
        let heading = if scan.is_demo() {
            "Demo Detections"
        } else {
            "Detections"
        };
        let _ = writeln!(body, "<h2>{}</h2>\n<ul>", heading);
        for detection in &scan.detections {
            let _ = writeln!(
                body,
                "<li class=\"detection\"><strong>{}</strong> {}</li>",
                escape(&detection.label),
                detection.confidence_percent()
            );
        }
        body.push_str("</ul>\n");
    }

    body.push_str(upload_form());
    layout(&body, refetch_on_focus)
}

pub fn error_page(message: &str) -> String {
    let body = format!(
        "<p class=\"error\">{}</p>\n{}",
        escape(message),
        upload_form()
    );
    layout(&body, false)
}

pub fn history_page(scans: Option<&[StoredScan]>) -> String {
    let Some(scans) = scans else {
        return layout(
            "<h2>History</h2>\n<p class=\"info\">Local store unavailable.</p>",
            false,
        );
    };

    let mut body = String::from("<h2>History</h2>\n");
    if scans.is_empty() {
        body.push_str("<p>No scans yet.</p>\n");
    }
    body.push_str("<ul>\n");
    for scan in scans {
        let labels: Vec<String> = scan
            .detections
            .iter()
            .map(|d| format!("{} {}", escape(&d.label), d.confidence_percent()))
            .collect();
        let _ = writeln!(
            body,
            "<li class=\"scan\">#{} {}{}: {}</li>",
            scan.id,
            &scan.key[..scan.key.len().min(12)],
            if scan.demo { " (demo)" } else { "" },
            if labels.is_empty() {
                "no detections".to_string()
            } else {
                labels.join(", ")
            }
        );
    }
    body.push_str("</ul>\n");
    layout(&body, false)
}
