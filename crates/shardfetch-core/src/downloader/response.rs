//! Track the status line and Content-Length of the current response from raw header lines.
//!
//! With redirects libcurl reports the headers of every hop, so a new status
//! line resets what was collected for the previous one.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub status: Option<u32>,
    pub content_length: Option<u64>,
}

impl ResponseHead {
    /// Feed one raw header line (as passed to curl's header callback).
    pub fn observe(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if line.starts_with("HTTP/") {
            *self = ResponseHead {
                status: line
                    .split_whitespace()
                    .nth(1)
                    .and_then(|code| code.parse().ok()),
                content_length: None,
            };
            return;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                self.content_length = value.trim().parse::<u64>().ok();
            }
        }
    }

    /// True once a 2xx status line has been seen for the current hop.
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }
}
