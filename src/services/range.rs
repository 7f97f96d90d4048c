//! Range resolver for `Range: bytes=...` request headers.

use crate::services::object_store::{StoreResult, resolve_bounds};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid range header `{0}`")]
pub struct RangeError(pub String);

/// Inclusive byte bounds requested by a client. Both absent means the whole
/// object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ByteRange {
    pub start: Option<u64>,
    /// Inclusive end, or the suffix length when `start` is absent.
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Parse the raw header value. `None` yields the full range.
    ///
    /// Accepted forms are `bytes=a-b`, `bytes=-n` and `bytes=a-`.
    pub fn parse(header: Option<&str>) -> Result<Self, RangeError> {
        let Some(raw) = header else {
            return Ok(Self::default());
        };
        let malformed = || RangeError(raw.to_string());

        let spec = raw.trim().strip_prefix("bytes=").ok_or_else(malformed)?;
        let (start, end) = spec.split_once('-').ok_or_else(malformed)?;
        let parse = |value: &str| -> Result<Option<u64>, RangeError> {
            let value = value.trim();
            if value.is_empty() {
                return Ok(None);
            }
            value.parse::<u64>().map(Some).map_err(|_| malformed())
        };

        let range = Self {
            start: parse(start)?,
            end: parse(end)?,
        };
        if range.is_full() {
            return Err(malformed());
        }
        Ok(range)
    }

    /// Concrete inclusive interval within an object of `size` bytes.
    pub fn resolve(&self, size: u64) -> StoreResult<Option<(u64, u64)>> {
        resolve_bounds(self.start, self.end, size)
    }
}

/// Value of the `Content-Range` header for a resolved interval.
pub fn content_range(start: u64, end: u64, size: u64) -> String {
    format!("bytes {}-{}/{}", start, end, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_header_is_full_range() {
        let range = ByteRange::parse(None).unwrap();
        assert!(range.is_full());
        assert_eq!(range.resolve(100).unwrap(), None);
    }

    #[test]
    fn parses_all_supported_forms() {
        let bounded = ByteRange::parse(Some("bytes=0-99")).unwrap();
        assert_eq!(bounded.resolve(1000).unwrap(), Some((0, 99)));

        let suffix = ByteRange::parse(Some("bytes=-100")).unwrap();
        assert_eq!(suffix.resolve(1000).unwrap(), Some((900, 999)));

        let open = ByteRange::parse(Some("bytes=500-")).unwrap();
        assert_eq!(open.resolve(1000).unwrap(), Some((500, 999)));
    }

    #[test]
    fn rejects_unparseable_headers() {
        for raw in ["bytes=", "bytes=-", "items=0-1", "bytes=a-b", "bytes=0-1,4-5", "0-1"] {
            assert!(ByteRange::parse(Some(raw)).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn rejects_out_of_bounds_intervals() {
        let reversed = ByteRange::parse(Some("bytes=10-5")).unwrap();
        assert!(reversed.resolve(100).is_err());
        let past_end = ByteRange::parse(Some("bytes=0-100")).unwrap();
        assert!(past_end.resolve(100).is_err());
    }

    #[test]
    fn formats_content_range() {
        assert_eq!(content_range(0, 9, 10), "bytes 0-9/10");
    }
}
