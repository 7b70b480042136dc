/// Renders rows as a plain text table with one column per heading.
pub fn fmt_table(headings: &[String], rows: &[Vec<String>]) -> String {
    let ncols = headings.len();
    let mut col_width = headings.iter().map(|h| h.chars().count() + 1).collect::<Vec<_>>();
    for row in rows {
        for (i, entry) in row.iter().enumerate().take(ncols) {
            col_width[i] = col_width[i].max(entry.chars().count() + 1);
        }
    }

    let mut result = String::new();
    append_row(&mut result, headings, &col_width);
    result.push('\n');
    for (i, width) in col_width.iter().enumerate() {
        result.push_str(&"-".repeat(*width));
        if i + 1 < ncols {
            result.push_str("+-");
        }
    }
    for row in rows {
        result.push('\n');
        append_row(&mut result, row, &col_width);
    }
    result
}

fn append_row(string: &mut String, row: &[String], col_width: &[usize]) {
    for (i, (entry, width)) in row.iter().zip(col_width).enumerate() {
        string.push_str(&format!("{:1$}", entry, width));
        if i + 1 < col_width.len() {
            string.push_str("| ");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_table() {
        let table = fmt_table(&["k".to_string(), "count".to_string()],
                              &[vec!["\"a\"".to_string(), "10".to_string()]]);
        assert_eq!(table, "k   | count \n----+-------\n\"a\" | 10    ");
    }
}
