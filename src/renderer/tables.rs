//! Wikitext table rendering.
//!
//! Tables are line-oriented. A line starting with `{|` opens a table and one
//! starting with `|}` closes it; everything between is captions (`|+`), row
//! separators (`|-`), header cells (`!`), data cells (`|`), or continuation
//! text for the last cell. Tables may nest inside cells. A finished table is
//! lifted into a block strip marker so that no later pass can change it.

use super::{
    Result, State,
    inline::render_inline,
    strip::Kind,
};
use crate::sanitize::{parse_attributes, write_attributes};

/// The class every rendered table carries.
const TABLE_CLASS: &str = "wiki-table";

/// A table cell.
#[derive(Debug, Default)]
struct Cell {
    /// True for `<th>`.
    header: bool,
    /// The raw attribute text.
    attrs: String,
    /// The raw cell content.
    content: String,
}

/// A table row.
#[derive(Debug, Default)]
struct Row {
    /// The raw attribute text.
    attrs: String,
    cells: Vec<Cell>,
}

/// A table under construction.
#[derive(Debug, Default)]
struct Table {
    /// The raw attribute text from the `{|` line.
    attrs: String,
    /// The raw caption content.
    caption: Option<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Appends a continuation line to the last cell or the caption.
    fn continue_line(&mut self, line: &str) {
        if let Some(cell) = self.rows.last_mut().and_then(|row| row.cells.last_mut()) {
            cell.content.push('\n');
            cell.content += line;
        } else if let Some(caption) = &mut self.caption {
            caption.push('\n');
            *caption += line;
        } else if !line.trim().is_empty() {
            log::debug!("dropping table text outside of any cell: {line:?}");
        }
    }

    /// Adds a cell to the last row, starting a row if there is none.
    fn push_cell(&mut self, header: bool, raw: &str) {
        let (attrs, content) = match find_outside_brackets(raw, "|") {
            Some(at) => (raw[..at].trim(), &raw[at + 1..]),
            None => ("", raw),
        };
        if self.rows.is_empty() {
            self.rows.push(Row::default());
        }
        if let Some(row) = self.rows.last_mut() {
            row.cells.push(Cell {
                header,
                attrs: attrs.to_string(),
                content: content.to_string(),
            });
        }
    }
}

/// Renders every table in `text`, replacing each outermost table with a
/// block strip marker.
pub(crate) fn render_tables(state: &mut State<'_>, text: &str) -> Result<String> {
    if !text.contains("{|") {
        return Ok(text.to_string());
    }

    let mut out = Vec::new();
    let mut stack = Vec::<Table>::new();

    for line in text.split('\n') {
        let trimmed = line.trim_start();

        if let Some(attrs) = trimmed.strip_prefix("{|") {
            stack.push(Table {
                attrs: attrs.trim().to_string(),
                ..<_>::default()
            });
            continue;
        }

        let Some(table) = stack.last_mut() else {
            out.push(line.to_string());
            continue;
        };

        if let Some(rest) = trimmed.strip_prefix("|}") {
            if let Some(table) = stack.pop() {
                let marker = finish(state, table)?;
                match stack.last_mut() {
                    Some(parent) => parent.continue_line(&format!("{marker}{rest}")),
                    None => out.push(format!("{marker}{rest}")),
                }
            }
        } else if let Some(rest) = trimmed.strip_prefix("|+") {
            let content = match find_outside_brackets(rest, "|") {
                Some(at) => &rest[at + 1..],
                None => rest,
            };
            table.caption = Some(content.to_string());
        } else if let Some(rest) = trimmed.strip_prefix("|-") {
            table.rows.push(Row {
                attrs: rest.trim_start_matches('-').trim().to_string(),
                cells: Vec::new(),
            });
        } else if let Some(rest) = trimmed.strip_prefix('!') {
            for raw in split_cells(rest, true) {
                table.push_cell(true, raw);
            }
        } else if let Some(rest) = trimmed.strip_prefix('|') {
            for raw in split_cells(rest, false) {
                table.push_cell(false, raw);
            }
        } else {
            table.continue_line(line);
        }
    }

    while let Some(table) = stack.pop() {
        log::debug!("closing unterminated table");
        let marker = finish(state, table)?;
        match stack.last_mut() {
            Some(parent) => parent.continue_line(&marker),
            None => out.push(marker),
        }
    }

    Ok(out.join("\n"))
}

/// Renders a finished table and returns the block marker standing in for it.
fn finish(state: &mut State<'_>, table: Table) -> Result<String> {
    let mut html = String::from("<table");
    let mut attrs = parse_attributes(&table.attrs);
    if let Some((_, class)) = attrs.iter_mut().find(|(name, _)| name == "class") {
        if !class.split_whitespace().any(|name| name == TABLE_CLASS) {
            *class = format!("{TABLE_CLASS} {class}").trim_end().to_string();
        }
    } else {
        attrs.insert(0, ("class".into(), TABLE_CLASS.into()));
    }
    write_attributes(&mut html, &attrs)?;
    html.push('>');

    if let Some(caption) = &table.caption {
        html += "<caption>";
        html += &render_inline(state, caption.trim());
        html += "</caption>";
    }

    for row in table.rows.iter().filter(|row| !row.cells.is_empty()) {
        html += "<tr";
        write_attributes(&mut html, &parse_attributes(&row.attrs))?;
        html.push('>');
        for cell in &row.cells {
            let tag = if cell.header { "th" } else { "td" };
            html.push('<');
            html += tag;
            write_attributes(&mut html, &parse_attributes(&cell.attrs))?;
            html.push('>');
            html += &render_inline(state, cell.content.trim());
            html += "</";
            html += tag;
            html.push('>');
        }
        html += "</tr>";
    }

    html += "</table>";
    Ok(state.strip.push(Kind::Block, html))
}

/// Splits a cell line into cells on `||`, and also on `!!` for header lines.
fn split_cells(line: &str, header: bool) -> Vec<&str> {
    let mut cells = Vec::new();
    let mut rest = line;
    loop {
        let next = match (
            find_outside_brackets(rest, "||"),
            header.then(|| find_outside_brackets(rest, "!!")).flatten(),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        match next {
            Some(at) => {
                cells.push(&rest[..at]);
                rest = &rest[at + 2..];
            }
            None => {
                cells.push(rest);
                return cells;
            }
        }
    }
}

/// Finds the first occurrence of `pattern` in `text` which is not inside
/// square brackets.
pub(super) fn find_outside_brackets(text: &str, pattern: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0_usize;
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'[' => depth += 1,
            b']' => depth = depth.saturating_sub(1),
            _ if depth == 0 && bytes[index..].starts_with(pattern.as_bytes()) => {
                return Some(index);
            }
            _ => {}
        }
        index += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splitting() {
        assert_eq!(split_cells(" a || b || [[c|d]]", false), [" a ", " b ", " [[c|d]]"]);
        assert_eq!(split_cells(" a !! b || c", true), [" a ", " b ", " c"]);
        assert_eq!(split_cells(" a !! b", false), [" a !! b"]);
        assert_eq!(find_outside_brackets("[[a|b]] | c", "|"), Some(8));
        assert_eq!(find_outside_brackets("[[a|b]]", "|"), None);
    }

    #[test]
    fn cell_attributes() {
        let mut table = Table::default();
        table.push_cell(false, r#" style="color:red" | red"#);
        table.push_cell(false, " [[Al-Andalus|Andalusia]]");
        let cells = &table.rows[0].cells;
        assert_eq!(cells[0].attrs, r#"style="color:red""#);
        assert_eq!(cells[0].content, " red");
        assert_eq!(cells[1].attrs, "", "a pipe inside a link is not an attribute separator");
    }
}
