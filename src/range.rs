//! `Range` header parsing and resolution against a known body size.

use axum::http::HeaderValue;
use axum_extra::headers::ContentRange;

/// Byte window requested through a `Range: bytes=<start>-<end>` header.
///
/// Parsing never fails. A bound that is missing or not a decimal offset is
/// recorded as absent and replaced by its default when the request is
/// [resolved](RangeRequest::resolve): `0` for the start, the last byte of the
/// body for the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeRequest {
    start: Option<u64>,
    end: Option<u64>,
}

impl RangeRequest {
    /// Construct a request from already parsed bounds.
    pub fn new(start: Option<u64>, end: Option<u64>) -> Self {
        RangeRequest { start, end }
    }

    /// Parse the raw value of a `Range` header.
    ///
    /// Only the first `-`-separated pair after the `=` is looked at, so a
    /// multi-range value such as `bytes=0-4,10-20` degrades to a start of `0`
    /// and a defaulted end.
    pub fn parse(header: &str) -> Self {
        let spec = header.split('=').nth(1).unwrap_or_default();
        let mut bounds = spec.split('-');
        let start = bounds.next().and_then(parse_offset);
        let end = bounds.next().and_then(parse_offset);
        RangeRequest { start, end }
    }

    /// Parse a `Range` header value. Values that are not visible ASCII are
    /// treated as if both bounds were malformed.
    pub fn from_header(value: &HeaderValue) -> Self {
        value.to_str().map(Self::parse).unwrap_or_default()
    }

    pub fn start(&self) -> Option<u64> {
        self.start
    }

    pub fn end(&self) -> Option<u64> {
        self.end
    }

    /// Resolve the request against a body of `size` bytes.
    ///
    /// The end is clamped to the last byte. Returns `None` when no byte can be
    /// served: an empty body, or a start past the (clamped) end.
    pub fn resolve(&self, size: u64) -> Option<ResolvedRange> {
        let last = size.checked_sub(1)?;
        let start = self.start.unwrap_or(0);
        let end = self.end.map_or(last, |end| end.min(last));
        (start <= end).then_some(ResolvedRange { start, end })
    }
}

fn parse_offset(field: &str) -> Option<u64> {
    field.parse().ok()
}

/// Inclusive byte window actually served, `start <= end < size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    start: u64,
    end: u64,
}

impl ResolvedRange {
    /// The window covering a whole body of `size` bytes, `None` if empty.
    pub fn full(size: u64) -> Option<Self> {
        RangeRequest::default().resolve(size)
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes in the window.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range: bytes {start}-{end}/{size}`.
    pub fn content_range(&self, size: u64) -> Option<ContentRange> {
        ContentRange::bytes(self.start..=self.end, size).ok()
    }
}
