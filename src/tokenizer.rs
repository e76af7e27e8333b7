//! Default tokenizer producing the lexer's input stream.
//!
//! Splits on Unicode word boundaries (UAX #29) and reports codepoint spans.
//! Whitespace runs are kept as their own tokens so callers can see them; the
//! lexer skips them. Mixed tokens such as `LX38.00` stay whole here; the lexer
//! is responsible for splitting them by character class.

use crate::Token;
use unicode_segmentation::UnicodeSegmentation;

pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut codepoint = 0usize;
    for word in text.split_word_bounds() {
        let len = word.chars().count();
        tokens.push(Token::new(word, codepoint, codepoint + len));
        codepoint += len;
    }
    tokens
}
