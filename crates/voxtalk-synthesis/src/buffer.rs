/// Where a [`TextChunkBuffer`] may split its pending text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Split at clause or sentence punctuation. The mark itself is dropped.
    Punctuation,
    /// Split after a closing tag, which stays with the emitted chunk.
    Markup { closing_tag: String },
}

impl FlushPolicy {
    pub fn ssml() -> Self {
        FlushPolicy::Markup {
            closing_tag: "</speak>".to_string(),
        }
    }
}

const BOUNDARIES: &[char] = &[
    '.', ',', ';', ':', '!', '?', '…', '。', '、', '，', '！', '？', '；', '：',
];

/// Accumulates streamed text and releases speakable chunks.
#[derive(Debug, Clone)]
pub struct TextChunkBuffer {
    pending: String,
    min_flush_length: usize,
    policy: FlushPolicy,
}

impl TextChunkBuffer {
    pub fn new(policy: FlushPolicy, min_flush_length: usize) -> Self {
        Self {
            pending: String::new(),
            min_flush_length,
            policy,
        }
    }

    pub fn on_message_received(&mut self, text: &str) {
        self.pending.push_str(text);
    }

    /// Release the next chunk.
    ///
    /// `force_all` takes everything, even an empty buffer, and ignores the
    /// minimum length. Otherwise a chunk is released only at a boundary whose
    /// chunk is at least `min_flush_length` characters long.
    pub fn flush(&mut self, force_all: bool) -> Option<String> {
        if force_all {
            return Some(std::mem::take(&mut self.pending));
        }
        let (end, resume) = match &self.policy {
            FlushPolicy::Punctuation => self.punctuation_split()?,
            FlushPolicy::Markup { closing_tag } => self.markup_split(closing_tag)?,
        };
        let chunk = self.pending[..end].to_string();
        self.pending.drain(..resume);
        Some(chunk)
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Put text back in front of whatever is pending.
    pub fn requeue_front(&mut self, text: &str) {
        self.pending.insert_str(0, text);
    }

    pub fn pending_text(&self) -> &str {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn min_flush_length(&self) -> usize {
        self.min_flush_length
    }

    pub fn set_min_flush_length(&mut self, min_flush_length: usize) {
        self.min_flush_length = min_flush_length;
    }

    pub fn policy(&self) -> &FlushPolicy {
        &self.policy
    }

    /// Byte offsets of the chunk end and of where the retained text starts.
    fn punctuation_split(&self) -> Option<(usize, usize)> {
        let text = self.pending.as_str();
        let mut chars_before = 0;
        let mut prev: Option<char> = None;
        let mut iter = text.char_indices().peekable();
        while let Some((idx, c)) = iter.next() {
            let next = iter.peek().map(|&(_, n)| n);
            if BOUNDARIES.contains(&c)
                && !is_numeric_separator(prev, c, next)
                && chars_before >= self.min_flush_length
            {
                return Some((idx, idx + c.len_utf8()));
            }
            chars_before += 1;
            prev = Some(c);
        }
        None
    }

    fn markup_split(&self, closing_tag: &str) -> Option<(usize, usize)> {
        if closing_tag.is_empty() {
            return None;
        }
        self.pending
            .match_indices(closing_tag)
            .map(|(idx, tag)| idx + tag.len())
            .find(|&end| self.pending[..end].chars().count() >= self.min_flush_length)
            .map(|end| (end, end))
    }
}

// "3.14" and "1,000" are not clause boundaries.
fn is_numeric_separator(prev: Option<char>, c: char, next: Option<char>) -> bool {
    matches!(c, '.' | ',')
        && prev.is_some_and(|p| p.is_ascii_digit())
        && next.is_some_and(|n| n.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(min: usize) -> TextChunkBuffer {
        TextChunkBuffer::new(FlushPolicy::Punctuation, min)
    }

    #[test]
    fn test_comma_is_consumed_and_remainder_kept() {
        let mut buffer = plain(0);
        buffer.on_message_received("Hello, world");
        assert_eq!(buffer.flush(false).as_deref(), Some("Hello"));
        assert_eq!(buffer.pending_text(), " world");
        assert_eq!(buffer.flush(false), None);
    }

    #[test]
    fn test_force_flush_takes_everything_and_resets() {
        let mut buffer = plain(50);
        buffer.on_message_received("no boundary here");
        assert_eq!(buffer.flush(true).as_deref(), Some("no boundary here"));
        assert!(buffer.is_empty());
        assert_eq!(buffer.flush(true).as_deref(), Some(""));
    }

    #[test]
    fn test_force_flush_ignores_markup_policy() {
        let mut buffer = TextChunkBuffer::new(FlushPolicy::ssml(), 100);
        buffer.on_message_received("<speak>hi");
        assert_eq!(buffer.flush(true).as_deref(), Some("<speak>hi"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_short_clause_is_held_until_minimum_reached() {
        let mut buffer = plain(10);
        buffer.on_message_received("Hi, ");
        assert_eq!(buffer.flush(false), None);
        buffer.on_message_received("how are you today? Fine");
        assert_eq!(buffer.flush(false).as_deref(), Some("Hi, how are you today"));
        assert_eq!(buffer.pending_text(), " Fine");
    }

    #[test]
    fn test_no_boundary_keeps_accumulating() {
        let mut buffer = plain(0);
        buffer.on_message_received("streaming tokens");
        assert_eq!(buffer.flush(false), None);
        buffer.on_message_received(" arrive slowly");
        assert_eq!(buffer.pending_text(), "streaming tokens arrive slowly");
    }

    #[test]
    fn test_decimal_point_is_not_a_boundary() {
        let mut buffer = plain(0);
        buffer.on_message_received("Pi is 3.14 roughly. Yes");
        assert_eq!(buffer.flush(false).as_deref(), Some("Pi is 3.14 roughly"));
        assert_eq!(buffer.pending_text(), " Yes");
    }

    #[test]
    fn test_unicode_punctuation_splits() {
        let mut buffer = plain(0);
        buffer.on_message_received("你好。世界");
        assert_eq!(buffer.flush(false).as_deref(), Some("你好"));
        assert_eq!(buffer.pending_text(), "世界");
    }

    #[test]
    fn test_markup_chunk_includes_closing_tag() {
        let mut buffer = TextChunkBuffer::new(FlushPolicy::ssml(), 0);
        buffer.on_message_received("<speak>One.</speak><speak>Two");
        assert_eq!(buffer.flush(false).as_deref(), Some("<speak>One.</speak>"));
        assert_eq!(buffer.pending_text(), "<speak>Two");
        assert_eq!(buffer.flush(false), None);
    }

    #[test]
    fn test_markup_holds_short_chunk_without_reset() {
        let mut buffer = TextChunkBuffer::new(FlushPolicy::ssml(), 30);
        buffer.on_message_received("<speak>Hi</speak>");
        assert_eq!(buffer.flush(false), None);
        assert_eq!(buffer.pending_text(), "<speak>Hi</speak>");
        buffer.on_message_received("<speak>and a longer one</speak>");
        assert_eq!(
            buffer.flush(false).as_deref(),
            Some("<speak>Hi</speak><speak>and a longer one</speak>")
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_requeue_front_and_reset() {
        let mut buffer = plain(0);
        buffer.on_message_received("world.");
        buffer.requeue_front("hello ");
        assert_eq!(buffer.pending_text(), "hello world.");
        buffer.reset();
        assert!(buffer.is_empty());
    }
}
