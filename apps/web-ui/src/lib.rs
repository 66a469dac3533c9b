use std::fmt::Write as _;
use std::sync::{Arc, RwLock};

use view_core::{EVICT_TABLE_HEADER, PEER_TABLE_HEADER, POLL_INTERVAL, StatusView, ViewSink};

pub const WRAPPER_ID: &str = "wrapper";
pub const TABLE_CLASS: &str = "peerStatusTable";

/// Markup for the peer table followed by the eviction table.
pub fn tables_html(view: &StatusView) -> String {
    let mut html = String::new();

    open_table(&mut html, &PEER_TABLE_HEADER);
    for row in &view.peer_rows {
        match row.freshness {
            Some(freshness) => {
                let _ = write!(html, "<tr style=\"background-color: {}\">", freshness.color());
            }
            None => html.push_str("<tr>"),
        }
        push_cells(&mut html, &row.cells());
        html.push_str("</tr>");
    }
    html.push_str("</table>");

    open_table(&mut html, &EVICT_TABLE_HEADER);
    for row in &view.evict_rows {
        html.push_str("<tr>");
        push_cells(&mut html, &row.cells());
        html.push_str("</tr>");
    }
    html.push_str("</table>");

    html
}

fn open_table(html: &mut String, header: &[&str]) {
    let _ = write!(html, "<table class='{TABLE_CLASS}'><tr>");
    for title in header {
        let _ = write!(html, "<th>{}</th>", escape_html(title));
    }
    html.push_str("</tr>");
}

fn push_cells(html: &mut String, cells: &[&str]) {
    for cell in cells {
        let _ = write!(html, "<td>{}</td>", escape_html(cell));
    }
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Plain-text rendering of both tables, one row per line.
pub fn render_text(view: &StatusView) -> String {
    let peer_rows: Vec<Vec<&str>> = view.peer_rows.iter().map(|r| r.cells().to_vec()).collect();
    let evict_rows: Vec<Vec<&str>> = view.evict_rows.iter().map(|r| r.cells().to_vec()).collect();

    let mut text = String::new();
    write_text_table(&mut text, &PEER_TABLE_HEADER, &peer_rows);
    text.push('\n');
    write_text_table(&mut text, &EVICT_TABLE_HEADER, &evict_rows);
    text
}

fn write_text_table(out: &mut String, header: &[&str], rows: &[Vec<&str>]) {
    let columns = header
        .len()
        .max(rows.iter().map(Vec::len).max().unwrap_or(0));
    let mut widths = vec![0usize; columns];
    for line in std::iter::once(header).chain(rows.iter().map(Vec::as_slice)) {
        for (column, cell) in line.iter().enumerate() {
            widths[column] = widths[column].max(cell.chars().count());
        }
    }

    for line in std::iter::once(header).chain(rows.iter().map(Vec::as_slice)) {
        let cells: Vec<String> = line
            .iter()
            .enumerate()
            .map(|(column, cell)| format!("{cell:<width$}", width = widths[column]))
            .collect();
        let _ = writeln!(out, "{}", cells.join(" | ").trim_end());
    }
}

/// The `wrapper` element: holds the markup of the latest successful cycle.
#[derive(Clone, Default)]
pub struct HtmlContainer {
    contents: Arc<RwLock<String>>,
}

impl HtmlContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        match self.contents.read() {
            Ok(contents) => contents.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces everything in the container with the two tables.
    pub fn replace(&self, view: &StatusView) {
        let markup = tables_html(view);
        match self.contents.write() {
            Ok(mut contents) => *contents = markup,
            Err(poisoned) => *poisoned.into_inner() = markup,
        }
    }
}

impl ViewSink for HtmlContainer {
    fn apply(&self, view: &StatusView) {
        self.replace(view);
    }
}

pub fn page_html(container: &HtmlContainer) -> String {
    format!(
        "<!doctype html>
<html lang=\"en\">
<head>
  <meta charset=\"utf-8\" />
  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />
  <title>Multi-Master Status</title>
</head>
<body>
  <div id=\"{wrapper}\">{contents}</div>
  <script>
    async function refreshWrapper() {{
      try {{
        const response = await fetch('wrapper', {{ cache: 'no-store' }});
        if (response.ok) {{
          document.getElementById('{wrapper}').innerHTML = await response.text();
        }}
      }} catch (error) {{
      }}
    }}

    setInterval(refreshWrapper, {interval_ms});
  </script>
</body>
</html>\n",
        wrapper = WRAPPER_ID,
        contents = container.contents(),
        interval_ms = POLL_INTERVAL.as_millis(),
    )
}
