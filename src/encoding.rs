//! URL quoting for redirect targets and reversed paths.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::borrow::Cow;

/// Left as-is when turning an IRI into a URI. `%` is kept so that
/// already-quoted input is not quoted twice.
const IRI_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/')
    .remove(b'#')
    .remove(b'%')
    .remove(b'[')
    .remove(b']')
    .remove(b'=')
    .remove(b':')
    .remove(b';')
    .remove(b'$')
    .remove(b'&')
    .remove(b'(')
    .remove(b')')
    .remove(b'+')
    .remove(b',')
    .remove(b'!')
    .remove(b'?')
    .remove(b'*')
    .remove(b'@')
    .remove(b'\'');

/// Left as-is in a reversed path: RFC 3986 sub-delimiters plus `/~:@`.
const PATH_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b'/')
    .remove(b':')
    .remove(b'@');

/// Percent-encode non-ASCII and unsafe characters of a URL.
pub fn iri_to_uri(iri: &str) -> Cow<'_, str> {
    utf8_percent_encode(iri, IRI_SAFE).into()
}

/// Quote a reversed path. Unlike [`iri_to_uri`], a literal `%` is escaped.
pub fn quote_path(path: &str) -> Cow<'_, str> {
    utf8_percent_encode(path, PATH_SAFE).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iri_to_uri() {
        assert_eq!(iri_to_uri("/café/"), "/caf%C3%A9/");
        assert_eq!(iri_to_uri("/search/?q=a b&page=2#top"), "/search/?q=a%20b&page=2#top");
        assert_eq!(iri_to_uri("https://example.com/zoë"), "https://example.com/zo%C3%AB");
        // Already quoted input is left alone
        assert_eq!(iri_to_uri("/caf%C3%A9/"), "/caf%C3%A9/");
    }

    #[test]
    fn test_iri_to_uri_borrows_plain_ascii() {
        assert!(matches!(iri_to_uri("/plain/path/"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_quote_path() {
        assert_eq!(quote_path("/users/zoë/"), "/users/zo%C3%AB/");
        assert_eq!(quote_path("/100%/"), "/100%25/");
        assert_eq!(quote_path("/a b?c/"), "/a%20b%3Fc/");
        assert_eq!(quote_path("/x:y@z;k=v/"), "/x:y@z;k=v/");
    }
}
