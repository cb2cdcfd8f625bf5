use crate::error::SERVANT_ERR_HEADER;
use crate::session::Reply;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use http::StatusCode;
use may_minihttp::Response;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Most distinct header lines kept for the life of the process.
pub const MAX_INTERNED_LINES: usize = 4096;
/// Longest header line that is interned.
pub const MAX_INTERNED_LINE_LEN: usize = 512;

/// Sent in place of an error line that cannot be interned.
const ERR_FALLBACK_LINE: &str = "X-Servant-Err: request failed";

/// `may_minihttp` only takes `'static` header lines, so each distinct
/// `Name: value` pair is leaked once and reused. Both the number and the
/// length of retained lines are capped; error text can echo request input.
struct LineInterner {
    lines: DashMap<String, &'static str>,
    count: AtomicUsize,
    max_lines: usize,
    max_len: usize,
}

impl LineInterner {
    fn new(max_lines: usize, max_len: usize) -> Self {
        Self {
            lines: DashMap::new(),
            count: AtomicUsize::new(0),
            max_lines,
            max_len,
        }
    }

    /// `None` when the line is too long or the table is full.
    fn intern(&self, name: &str, value: &str) -> Option<&'static str> {
        let line = format!("{name}: {value}");
        if line.len() > self.max_len {
            return None;
        }
        if let Some(existing) = self.lines.get(&line) {
            return Some(*existing);
        }
        match self.lines.entry(line) {
            Entry::Occupied(e) => Some(*e.get()),
            Entry::Vacant(e) => {
                if self.count.fetch_add(1, Ordering::Relaxed) >= self.max_lines {
                    self.count.fetch_sub(1, Ordering::Relaxed);
                    return None;
                }
                let leaked: &'static str = Box::leak(e.key().clone().into_boxed_str());
                e.insert(leaked);
                Some(leaked)
            }
        }
    }

    fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Header lines for `reply`. An error line that cannot be interned is
    /// replaced by a fixed one; other such headers are dropped.
    fn reply_lines(&self, reply: &Reply) -> Vec<&'static str> {
        reply
            .headers
            .iter()
            .filter_map(|(name, value)| match self.intern(name, value) {
                Some(line) => Some(line),
                None if name.eq_ignore_ascii_case(SERVANT_ERR_HEADER) => Some(ERR_FALLBACK_LINE),
                None => {
                    debug!(header = %name, "header not interned, dropped");
                    None
                }
            })
            .collect()
    }
}

static HEADER_LINES: Lazy<LineInterner> =
    Lazy::new(|| LineInterner::new(MAX_INTERNED_LINES, MAX_INTERNED_LINE_LEN));

fn status_reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown")
}

/// Flush a buffered [`Reply`] into the transport response.
pub fn write_reply(res: &mut Response, reply: Reply) {
    res.status_code(reply.status.as_u16() as usize, status_reason(reply.status));
    for line in HEADER_LINES.reply_lines(&reply) {
        res.header(line);
    }
    res.body_vec(reply.body);
}
