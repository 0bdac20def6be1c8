// URL pattern rendering

use crate::datasource::Row;

/// Build an absolute URL from a `{field}` pattern and a row.
///
/// Placeholders without a matching field are left in the output untouched.
/// A result that has no `scheme://` prefix is treated as a path on `base_url`
/// and served over https.
pub fn render_url(base_url: &str, pattern: &str, row: &Row) -> String {
    let mut rendered = String::with_capacity(pattern.len() + 16);
    let mut rest = pattern;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];

        match after_open.find('}') {
            Some(close) => {
                let field = &after_open[..close];
                match row.get(field) {
                    Some(value) if !field.is_empty() => rendered.push_str(&value.to_string()),
                    _ => {
                        rendered.push('{');
                        rendered.push_str(field);
                        rendered.push('}');
                    }
                }
                rest = &after_open[close + 1..];
            }
            None => {
                rendered.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    rendered.push_str(rest);

    if has_scheme(&rendered) {
        return rendered;
    }

    let base = base_url.trim_end_matches('/');
    if rendered.starts_with('/') {
        format!("https://{}{}", base, rendered)
    } else {
        format!("https://{}/{}", base, rendered)
    }
}

/// True when `s` starts with `scheme://` where scheme follows RFC 3986.
fn has_scheme(s: &str) -> bool {
    let Some(idx) = s.find("://") else {
        return false;
    };
    let scheme = &s[..idx];
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}
