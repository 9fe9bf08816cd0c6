//! `Link` header parsing.

use url::Url;

/// Find the `rel="next"` target in a `Link` header value.
///
/// Relative targets are resolved against `base`, the URL of the page that
/// carried the header.
pub fn next_link(header: &str, base: &Url) -> Option<Url> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts
            .next()?
            .trim()
            .strip_prefix('<')?
            .strip_suffix('>')?;

        let is_next = parts.any(|param| {
            let Some((name, value)) = param.split_once('=') else {
                return false;
            };
            name.trim().eq_ignore_ascii_case("rel")
                && value
                    .trim()
                    .trim_matches('"')
                    .split_whitespace()
                    .any(|rel| rel.eq_ignore_ascii_case("next"))
        });

        if is_next {
            base.join(target).ok()
        } else {
            None
        }
    })
}
