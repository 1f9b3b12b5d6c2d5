use crate::errors::MortarError;
use crate::views::ResolvedView;
use regex::Regex;

// IRI references, string literals and comments may contain text that looks
// like a variable; they are matched first so they are skipped as a whole.
const OPAQUE_TOKENS: &str = r#"<[^<>"{}|^`\\\x00-\x20]*>|"(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'|#[^\n]*"#;

/// Specializes a view template for one timeseries: every projected column
/// not in `data_vars` has its first variable token removed from the text.
pub fn rewrite(
    resolved: &ResolvedView,
    view: &str,
    data_vars: &[String],
) -> Result<String, MortarError> {
    let data_vars: Vec<&str> = data_vars.iter().map(|v| normalize_var(v)).collect();
    let missing: Vec<String> = data_vars
        .iter()
        .filter(|v| !resolved.columns.iter().any(|c| c == *v))
        .map(|v| v.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(MortarError::InvalidDataVars {
            view: view.to_string(),
            missing,
        });
    }

    let mut query = resolved.definition.clone();
    for column in &resolved.columns {
        if !data_vars.contains(&column.as_str()) {
            query = remove_first_variable(&query, column)?;
        }
    }
    Ok(query)
}

/// Data vars may be written with or without the leading `?`.
pub fn normalize_var(var: &str) -> &str {
    var.trim().trim_start_matches(['?', '$'])
}

/// Removes the first `?var` or `$var` token. Longer variables sharing the
/// prefix, IRIs, literals and comments are left untouched.
pub fn remove_first_variable(query: &str, var: &str) -> Result<String, MortarError> {
    let token_regex = variable_token_regex(var)?;
    for caps in token_regex.captures_iter(query) {
        if let Some(m) = caps.name("var") {
            let mut rewritten = String::with_capacity(query.len());
            rewritten.push_str(&query[..m.start()]);
            rewritten.push_str(&query[m.end()..]);
            return Ok(rewritten);
        }
    }
    Ok(query.to_string())
}

fn variable_token_regex(var: &str) -> Result<Regex, MortarError> {
    let pattern = format!(r"{}|(?P<var>[?$]{}\b)", OPAQUE_TOKENS, regex::escape(var));
    Regex::new(&pattern).map_err(|x| MortarError::RewriteError(x.to_string()))
}
