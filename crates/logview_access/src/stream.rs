//! StreamRegistry: token-addressed buffers drained in bounded chunks.
//!
//! Opening stores the full text under a token derived from the source path.
//! Re-opening the same path therefore lands on the same slot: the buffer is
//! replaced and its cursor reset, and every holder of the token sees the new
//! session. This is de-duplication of concurrent opens, not a content cache.
//!
//! An empty chunk is the only end-of-stream signal. The session is dropped on
//! that read, and unknown tokens read as empty too, so "finished" and "never
//! existed" look the same to the caller.

use logview_security::stream_token;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

struct StreamSession {
    text: String,
    cursor: usize,
}

pub struct StreamRegistry {
    sessions: Mutex<HashMap<String, StreamSession>>,
    chunk_bytes: usize,
}

impl StreamRegistry {
    pub fn new(chunk_bytes: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    /// Register `text` read from `source`; returns the stream token.
    pub fn open(&self, source: &str, text: String) -> String {
        let token = stream_token(source);
        debug!(source, token = %token, bytes = text.len(), "Stream opened");
        self.lock()
            .insert(token.clone(), StreamSession { text, cursor: 0 });
        token
    }

    /// Next run of whole lines, at most about `chunk_bytes` long.
    ///
    /// Lines are never split; a single line longer than the ceiling is
    /// returned on its own.
    pub fn read_chunk(&self, token: &str) -> String {
        let mut sessions = self.lock();
        let Some(session) = sessions.get_mut(token) else {
            return String::new();
        };

        let rest = &session.text[session.cursor..];
        if rest.is_empty() {
            sessions.remove(token);
            debug!(token, "Stream drained");
            return String::new();
        }

        let mut end = 0;
        while end < rest.len() && end < self.chunk_bytes {
            end = match rest[end..].find('\n') {
                Some(newline) => end + newline + 1,
                None => rest.len(),
            };
        }
        let chunk = rest[..end].to_string();
        session.cursor += end;
        chunk
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StreamSession>> {
        // A panic mid-read leaves the map itself consistent.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
