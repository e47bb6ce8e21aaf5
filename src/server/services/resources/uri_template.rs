//! URI templates
//!
//! Level 1 RFC 6570 templates: literal text with `{name}` placeholders. A
//! placeholder matches one or more characters up to the next `/` and its
//! value is percent-decoded.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::protocol::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Segment of a URI template
enum Segment {
    /// Literal text
    Literal(String),
    /// Parameter placeholder
    Parameter(String),
}

/// A parsed URI template
#[derive(Debug, Clone)]
pub struct UriTemplate {
    /// The template string
    template: String,
    /// Parsed segments
    segments: Vec<Segment>,
}

impl UriTemplate {
    /// Parse a template string
    pub fn parse(template: &str) -> Result<Self, Error> {
        let mut segments = Vec::new();
        let mut rest = template;

        while !rest.is_empty() {
            match rest.find('{') {
                Some(start) => {
                    if start > 0 {
                        segments.push(Segment::Literal(rest[..start].to_string()));
                    }
                    let end = rest[start..]
                        .find('}')
                        .map(|offset| start + offset)
                        .ok_or_else(|| {
                            Error::InvalidParams(format!("unclosed placeholder in {}", template))
                        })?;
                    let name = &rest[start + 1..end];
                    if name.is_empty() || name.contains('{') {
                        return Err(
                            Error::InvalidParams(format!("invalid placeholder in {}", template))
                        );
                    }
                    if matches!(segments.last(), Some(Segment::Parameter(_))) {
                        return Err(
                            Error::InvalidParams(format!("adjacent placeholders in {}", template))
                        );
                    }
                    segments.push(Segment::Parameter(name.to_string()));
                    rest = &rest[end + 1..];
                }
                None => {
                    segments.push(Segment::Literal(rest.to_string()));
                    rest = "";
                }
            }
        }

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    /// The template string
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Names of the placeholders, in order
    pub fn variables(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| {
                match segment {
                    Segment::Parameter(name) => Some(name.as_str()),
                    Segment::Literal(_) => None,
                }
            })
            .collect()
    }

    /// Total length of the literal text
    pub fn literal_len(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| {
                match segment {
                    Segment::Literal(text) => text.len(),
                    Segment::Parameter(_) => 0,
                }
            })
            .sum()
    }

    /// Whether the template has no placeholders
    pub fn is_literal(&self) -> bool {
        self.variables().is_empty()
    }

    /// Match a URI against this template and extract the decoded parameters
    pub fn match_uri(&self, uri: &str) -> Option<HashMap<String, String>> {
        let mut raw = Vec::new();
        if !match_segments(&self.segments, uri, &mut raw) {
            return None;
        }

        let mut params = HashMap::new();
        for (name, value) in raw {
            let decoded = urlencoding::decode(value).ok()?;
            params.insert(name.to_string(), decoded.into_owned());
        }
        Some(params)
    }

    /// Substitute `params` into the template, percent-encoding each value
    pub fn expand(&self, params: &HashMap<String, String>) -> Result<String, Error> {
        let mut uri = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => uri.push_str(text),
                Segment::Parameter(name) => {
                    let value = params
                        .get(name)
                        .ok_or_else(|| Error::InvalidParams(format!("missing value for {}", name)))?;
                    uri.push_str(&urlencoding::encode(value));
                }
            }
        }
        Ok(uri)
    }

    /// Order templates from most to least specific: more literal text first,
    /// then fewer placeholders.
    pub fn specificity_cmp(&self, other: &UriTemplate) -> Ordering {
        other
            .literal_len()
            .cmp(&self.literal_len())
            .then_with(|| self.variables().len().cmp(&other.variables().len()))
    }
}

fn match_segments<'t, 'u>(
    segments: &'t [Segment],
    uri: &'u str,
    captured: &mut Vec<(&'t str, &'u str)>
) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return uri.is_empty();
    };

    match first {
        Segment::Literal(text) =>
            match uri.strip_prefix(text.as_str()) {
                Some(remaining) => match_segments(rest, remaining, captured),
                None => false,
            }
        Segment::Parameter(name) => {
            // A value is non-empty and stops at the next path separator.
            let limit = uri.find('/').unwrap_or(uri.len());
            for end in (1..=limit).filter(|end| uri.is_char_boundary(*end)) {
                captured.push((name.as_str(), &uri[..end]));
                if match_segments(rest, &uri[end..], captured) {
                    return true;
                }
                captured.pop();
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_match() {
        let template = UriTemplate::parse("config://{key}").unwrap();
        let params = template.match_uri("config://foobar").unwrap();
        assert_eq!(params.get("key").map(String::as_str), Some("foobar"));
        assert_eq!(template.variables(), vec!["key"]);
    }

    #[test]
    fn test_no_match() {
        let template = UriTemplate::parse("config://{key}").unwrap();
        assert!(template.match_uri("file://foobar").is_none());
        assert!(template.match_uri("config://").is_none());
        assert!(template.match_uri("config://a/b").is_none());
    }

    #[test]
    fn test_multiple_parameters() {
        let template = UriTemplate::parse("users://{user}/posts/{post}.json").unwrap();
        let params = template.match_uri("users://ada/posts/42.json").unwrap();
        assert_eq!(params["user"], "ada");
        assert_eq!(params["post"], "42");
    }

    #[test]
    fn test_values_are_percent_decoded() {
        let template = UriTemplate::parse("config://{key}").unwrap();
        let params = template.match_uri("config://hello%20world").unwrap();
        assert_eq!(params["key"], "hello world");
    }

    #[test]
    fn test_expand_round_trips() {
        let template = UriTemplate::parse("config://{key}").unwrap();
        let mut params = HashMap::new();
        params.insert("key".to_string(), "a b".to_string());
        let uri = template.expand(&params).unwrap();
        assert_eq!(uri, "config://a%20b");
        assert_eq!(template.match_uri(&uri).unwrap()["key"], "a b");
    }

    #[test]
    fn test_invalid_templates() {
        assert!(UriTemplate::parse("config://{key").is_err());
        assert!(UriTemplate::parse("config://{}").is_err());
        assert!(UriTemplate::parse("config://{a}{b}").is_err());
    }

    #[test]
    fn test_specificity_prefers_more_literal_text() {
        let general = UriTemplate::parse("config://{key}").unwrap();
        let specific = UriTemplate::parse("config://db-{name}").unwrap();
        assert_eq!(specific.specificity_cmp(&general), Ordering::Less);
        assert_eq!(general.specificity_cmp(&specific), Ordering::Greater);
    }
}
