//! JSON parsing helper for the identity provider's login-outcome response.

use anyhow::Result;

/// Parse JSON and, on failure, report the serde path and a snippet of the
/// offending line instead of a bare "expected X at line Y" message. The IdP
/// occasionally answers with an HTML error page where JSON is expected, and
/// the snippet makes that immediately obvious in logs.
pub fn parse_json_with_context<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_str(body);
    match serde_path_to_error::deserialize(de) {
        Ok(value) => Ok(value),
        Err(err) => {
            let inner = err.inner();
            let (line, column) = (inner.line(), inner.column());
            let path = err.path().to_string();
            let snippet = line_snippet(body, line, column, 40);

            let mut msg = String::new();
            if !path.is_empty() && path != "." {
                msg.push_str(&format!("at path '{path}': "));
            }
            msg.push_str(&format!("{inner}\n{snippet}"));
            Err(anyhow::anyhow!(msg))
        }
    }
}

/// Extract up to `radius` characters around `column` on the 1-indexed `line`,
/// with a caret marking the error position.
fn line_snippet(body: &str, line: usize, column: usize, radius: usize) -> String {
    let Some(text) = body.lines().nth(line.saturating_sub(1)) else {
        return String::new();
    };
    let chars: Vec<char> = text.chars().collect();
    let col = column.saturating_sub(1).min(chars.len());
    let start = col.saturating_sub(radius);
    let end = (col + radius).min(chars.len());
    let window: String = chars[start..end].iter().collect();
    let caret_pad = " ".repeat(col - start);
    format!("  {window}\n  {caret_pad}^")
}
