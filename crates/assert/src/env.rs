//! Environment variable expansion for URLs and tag values.

use std::env;

/// Replace `$VAR` and `${VAR}` with the value of the environment variable.
///
/// Unset variables expand to the empty string. A `$` that does not start a
/// variable reference is kept as is.
#[must_use]
pub fn expand_env(input: &str) -> String {
    if !input.contains('$') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                out.push_str(&lookup(&braced[..end]));
                rest = &braced[end + 1..];
                continue;
            }
            // Unterminated brace: keep the rest literally.
            out.push('$');
            rest = after;
            continue;
        }

        let len = after
            .char_indices()
            .find(|&(i, c)| !(c == '_' || c.is_ascii_alphanumeric()) || (i == 0 && c.is_ascii_digit()))
            .map_or(after.len(), |(i, _)| i);

        if len == 0 {
            out.push('$');
        } else {
            out.push_str(&lookup(&after[..len]));
        }
        rest = &after[len..];
    }

    out.push_str(rest);
    out
}

fn lookup(name: &str) -> String {
    env::var(name).unwrap_or_default()
}
