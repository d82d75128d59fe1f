/// Incremental newline framer over a UTF-8 byte stream.
///
/// Bytes of a multi-byte character split across reads are held back until the
/// character completes. Whatever follows the last `\n` stays buffered and is
/// dropped by [`LineFramer::finish`].
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: String,
    pending: Vec<u8>,
}

const REPLACEMENT: &str = "\u{FFFD}";

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one read and returns every line it completed, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.decode(bytes);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let tail = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, tail);
        complete
            .strip_suffix('\n')
            .unwrap_or(&complete)
            .split('\n')
            .map(str::to_string)
            .collect()
    }

    /// Ends the stream, discarding any unterminated trailing content.
    pub fn finish(self) -> usize {
        let discarded = self.buffer.len() + self.pending.len();
        if discarded > 0 {
            tracing::debug!(discarded, "dropping unterminated trailing stream content");
        }
        discarded
    }

    fn decode(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let mut input = std::mem::take(&mut self.pending);
        let mut cursor = 0;

        loop {
            let error = match std::str::from_utf8(&input[cursor..]) {
                Ok(valid) => {
                    self.buffer.push_str(valid);
                    return;
                }
                Err(error) => error,
            };

            let valid_end = cursor + error.valid_up_to();
            // valid_up_to guarantees this prefix decodes.
            if let Ok(valid) = std::str::from_utf8(&input[cursor..valid_end]) {
                self.buffer.push_str(valid);
            }
            match error.error_len() {
                Some(invalid_len) => {
                    self.buffer.push_str(REPLACEMENT);
                    cursor = valid_end + invalid_len;
                }
                None => {
                    // Incomplete sequence at the end of this read; wait for more bytes.
                    self.pending = input.split_off(valid_end);
                    return;
                }
            }
        }
    }
}
