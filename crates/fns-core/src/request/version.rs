//! Parsing and evaluation of `X-Fns-Request-Version` filters (spec §4.1).

use crate::error::CodeError;

/// One `pattern=beginVersion[:endVersion]` entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionFilter {
    pub service_pattern: String,
    pub begin: String,
    pub end: String,
    pub exact: bool,
}

impl VersionFilter {
    /// Wildcard-match on `*` only, which is the only pattern shape the
    /// teacher's `router::route::RoutePattern` contract and this spec both
    /// rely on (a single trailing/leading `*`, or an exact literal).
    fn pattern_matches(&self, service_name: &str) -> bool {
        match self.service_pattern.strip_suffix('*') {
            Some(prefix) => service_name.starts_with(prefix),
            None => self.service_pattern == service_name,
        }
    }

    pub fn accepts(&self, service_name: &str, version: &str) -> bool {
        if !self.pattern_matches(service_name) {
            return false;
        }
        if self.exact {
            self.begin.is_empty() || self.begin == version
        } else {
            let begin_ok = self.begin.is_empty() || version >= self.begin.as_str();
            let end_ok = self.end.is_empty() || version < self.end.as_str();
            begin_ok && end_ok
        }
    }
}

/// Ordered, OR-combined list of [`VersionFilter`]s, spec §3/§4.1.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AcceptedVersions(pub Vec<VersionFilter>);

impl AcceptedVersions {
    pub fn accept(&self, service_name: &str, version: &str) -> bool {
        if self.0.is_empty() {
            return true;
        }
        self.0.iter().any(|f| f.accepts(service_name, version))
    }

    /// Parse every `X-Fns-Request-Version` header value present on a
    /// request. Each value is `pattern=beginVersion[:endVersion]`; a missing
    /// end with no `:` means exact match, an empty begin/end defaults to
    /// "origin"/"latest" (represented as the empty string, which
    /// [`VersionFilter::accepts`] treats as unconstrained on that side).
    pub fn parse(values: &[String]) -> Result<Self, CodeError> {
        let mut filters = Vec::with_capacity(values.len());
        for raw in values {
            filters.push(Self::parse_one(raw)?);
        }
        Ok(Self(filters))
    }

    fn parse_one(raw: &str) -> Result<VersionFilter, CodeError> {
        let (pattern, rest) = raw.split_once('=').ok_or_else(|| {
            CodeError::warning("malformed X-Fns-Request-Version").with_meta("value", raw)
        })?;
        if pattern.is_empty() {
            return Err(
                CodeError::warning("malformed X-Fns-Request-Version").with_meta("value", raw)
            );
        }
        let (exact, begin, end) = match rest.split_once(':') {
            Some((begin, end)) => (false, begin.to_string(), end.to_string()),
            None => (true, rest.to_string(), String::new()),
        };
        Ok(VersionFilter {
            service_pattern: pattern.to_string(),
            begin,
            end,
            exact,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_requires_equal_version() {
        let f = AcceptedVersions::parse(&["billing=2.0.0".into()]).unwrap();
        assert!(f.accept("billing", "2.0.0"));
        assert!(!f.accept("billing", "1.0.0"));
    }

    #[test]
    fn range_match_is_half_open() {
        let f = AcceptedVersions::parse(&["billing=1.0.0:2.0.0".into()]).unwrap();
        assert!(f.accept("billing", "1.0.0"));
        assert!(!f.accept("billing", "2.0.0"));
        assert!(!f.accept("billing", "3.0.0"));
    }

    #[test]
    fn multiple_values_are_ored() {
        let f =
            AcceptedVersions::parse(&["billing=1.0.0".into(), "ledger=2.0.0:3.0.0".into()])
                .unwrap();
        assert!(f.accept("billing", "1.0.0"));
        assert!(f.accept("ledger", "2.5.0"));
        assert!(!f.accept("ledger", "3.0.0"));
    }

    #[test]
    fn malformed_value_is_rejected() {
        assert!(AcceptedVersions::parse(&["no-equals-sign".into()]).is_err());
    }
}
