use crate::error::{PdfError, Result};

/// Token types in content streams
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    Integer(i64),
    Real(f64),
    String(Vec<u8>),
    Name(String),
    /// Operators and the `true`, `false` and `null` keywords
    Keyword(String),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' | b'\0')
}

fn is_delimiter(ch: u8) -> bool {
    matches!(
        ch,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn syntax_error(position: usize, message: impl Into<String>) -> PdfError {
    PdfError::ParseError {
        position,
        message: message.into(),
    }
}

/// Whether `input` stops inside a string or inline image data, where any
/// byte appended to it becomes part of the value.
pub(crate) fn ends_inside_value(input: &[u8]) -> bool {
    let mut tokenizer = ContentTokenizer::new(input);
    loop {
        tokenizer.skip_whitespace();
        let opens_string = match input.get(tokenizer.position) {
            Some(b'(') => true,
            Some(b'<') => tokenizer.peek_next() != Some(b'<'),
            _ => false,
        };
        match tokenizer.next_token() {
            Ok(None) => return false,
            Ok(Some(Token::Keyword(keyword))) if keyword == "ID" => {
                if tokenizer.read_inline_data().is_err() {
                    return true;
                }
            }
            Ok(Some(_)) => {}
            Err(_) => return opens_string,
        }
    }
}

/// Content stream tokenizer
pub(super) struct ContentTokenizer<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> ContentTokenizer<'a> {
    pub(super) fn new(input: &'a [u8]) -> Self {
        Self { input, position: 0 }
    }

    pub(super) fn position(&self) -> usize {
        self.position
    }

    pub(super) fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_whitespace();

        if self.position >= self.input.len() {
            return Ok(None);
        }

        let ch = self.input[self.position];

        match ch {
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number(),
            b'(' => self.read_literal_string(),
            b'<' => {
                if self.peek_next() == Some(b'<') {
                    self.position += 2;
                    Ok(Some(Token::DictStart))
                } else {
                    self.read_hex_string()
                }
            }
            b'>' => {
                if self.peek_next() == Some(b'>') {
                    self.position += 2;
                    Ok(Some(Token::DictEnd))
                } else {
                    Err(syntax_error(self.position, "Unexpected '>'"))
                }
            }
            b'[' => {
                self.position += 1;
                Ok(Some(Token::ArrayStart))
            }
            b']' => {
                self.position += 1;
                Ok(Some(Token::ArrayEnd))
            }
            b'/' => self.read_name(),
            b')' | b'{' | b'}' => Err(syntax_error(
                self.position,
                format!("Unexpected {:?}", ch as char),
            )),
            _ => self.read_keyword(),
        }
    }

    /// Raw inline image data following an `ID` keyword, up to the `EI`
    /// that closes it.
    pub(super) fn read_inline_data(&mut self) -> Result<Vec<u8>> {
        let start_position = self.position;
        // a single whitespace byte separates ID from the data
        if self.position < self.input.len() && is_whitespace(self.input[self.position]) {
            self.position += 1;
        }
        let start = self.position;

        let mut cursor = start;
        while cursor + 1 < self.input.len() {
            let at_marker = self.input[cursor] == b'E' && self.input[cursor + 1] == b'I';
            let preceded = cursor == start || is_whitespace(self.input[cursor - 1]);
            let followed = cursor + 2 >= self.input.len()
                || is_whitespace(self.input[cursor + 2])
                || is_delimiter(self.input[cursor + 2]);
            if at_marker && preceded && followed {
                let mut end = cursor;
                if end > start && is_whitespace(self.input[end - 1]) {
                    end -= 1;
                }
                let data = self.input[start..end].to_vec();
                self.position = cursor + 2;
                return Ok(data);
            }
            cursor += 1;
        }

        Err(syntax_error(start_position, "Inline image without EI"))
    }

    fn skip_whitespace(&mut self) {
        while self.position < self.input.len() {
            match self.input[self.position] {
                ch if is_whitespace(ch) => self.position += 1,
                b'%' => self.skip_comment(),
                _ => break,
            }
        }
    }

    fn skip_comment(&mut self) {
        while self.position < self.input.len()
            && self.input[self.position] != b'\n'
            && self.input[self.position] != b'\r'
        {
            self.position += 1;
        }
    }

    fn peek_next(&self) -> Option<u8> {
        self.input.get(self.position + 1).copied()
    }

    fn read_number(&mut self) -> Result<Option<Token>> {
        let start = self.position;
        let mut has_dot = false;

        if self.input[self.position] == b'+' || self.input[self.position] == b'-' {
            self.position += 1;
        }

        while self.position < self.input.len() {
            match self.input[self.position] {
                b'0'..=b'9' => self.position += 1,
                b'.' if !has_dot => {
                    has_dot = true;
                    self.position += 1;
                }
                _ => break,
            }
        }

        let num_str = std::str::from_utf8(&self.input[start..self.position])
            .map_err(|_| syntax_error(start, "Invalid number format"))?;

        if has_dot {
            // "5." and ".5" are valid, a bare "." is not
            let value = num_str
                .parse::<f64>()
                .map_err(|_| syntax_error(start, "Invalid real number"))?;
            Ok(Some(Token::Real(value)))
        } else {
            let value = num_str
                .parse::<i64>()
                .map_err(|_| syntax_error(start, "Invalid integer number"))?;
            Ok(Some(Token::Integer(value)))
        }
    }

    fn read_literal_string(&mut self) -> Result<Option<Token>> {
        let start = self.position;
        self.position += 1;
        let mut result = Vec::new();
        let mut paren_depth = 1;
        let mut escape = false;

        while self.position < self.input.len() {
            let ch = self.input[self.position];
            self.position += 1;

            if escape {
                match ch {
                    b'n' => result.push(b'\n'),
                    b'r' => result.push(b'\r'),
                    b't' => result.push(b'\t'),
                    b'b' => result.push(b'\x08'),
                    b'f' => result.push(b'\x0C'),
                    b'0'..=b'7' => {
                        self.position -= 1;
                        result.push(self.read_octal_escape());
                    }
                    // line continuation
                    b'\n' => {}
                    b'\r' => {
                        if self.input.get(self.position) == Some(&b'\n') {
                            self.position += 1;
                        }
                    }
                    _ => result.push(ch),
                }
                escape = false;
            } else {
                match ch {
                    b'\\' => escape = true,
                    b'(' => {
                        paren_depth += 1;
                        result.push(ch);
                    }
                    b')' => {
                        paren_depth -= 1;
                        if paren_depth == 0 {
                            return Ok(Some(Token::String(result)));
                        }
                        result.push(ch);
                    }
                    _ => result.push(ch),
                }
            }
        }

        Err(syntax_error(start, "Unterminated literal string"))
    }

    fn read_octal_escape(&mut self) -> u8 {
        let mut value = 0u8;
        let mut count = 0;

        while count < 3 && self.position < self.input.len() {
            match self.input[self.position] {
                digit @ b'0'..=b'7' => {
                    value = value.wrapping_mul(8).wrapping_add(digit - b'0');
                    self.position += 1;
                    count += 1;
                }
                _ => break,
            }
        }

        value
    }

    fn read_hex_string(&mut self) -> Result<Option<Token>> {
        self.position += 1;
        let mut result = Vec::new();
        let mut nibble = None;

        while self.position < self.input.len() {
            let ch = self.input[self.position];

            match ch {
                b'>' => {
                    self.position += 1;
                    if let Some(n) = nibble {
                        result.push(n << 4);
                    }
                    return Ok(Some(Token::String(result)));
                }
                b'0'..=b'9' | b'A'..=b'F' | b'a'..=b'f' => {
                    let digit = match ch {
                        b'0'..=b'9' => ch - b'0',
                        b'A'..=b'F' => ch - b'A' + 10,
                        _ => ch - b'a' + 10,
                    };

                    if let Some(n) = nibble {
                        result.push((n << 4) | digit);
                        nibble = None;
                    } else {
                        nibble = Some(digit);
                    }
                    self.position += 1;
                }
                ch if is_whitespace(ch) => self.position += 1,
                _ => {
                    return Err(syntax_error(
                        self.position,
                        format!("Invalid character in hex string: {:?}", ch as char),
                    ));
                }
            }
        }

        Err(syntax_error(self.position, "Unterminated hex string"))
    }

    fn read_name(&mut self) -> Result<Option<Token>> {
        self.position += 1;
        let start = self.position;

        while self.position < self.input.len() {
            let ch = self.input[self.position];
            if is_whitespace(ch) || is_delimiter(ch) {
                break;
            }
            self.position += 1;
        }

        let name = self.decode_name(start)?;
        Ok(Some(Token::Name(name)))
    }

    fn decode_name(&self, start: usize) -> Result<String> {
        let bytes = &self.input[start..self.position];
        let mut result = Vec::with_capacity(bytes.len());
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] == b'#' && i + 2 < bytes.len() {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    .ok_or_else(|| syntax_error(start + i, "Invalid hex escape in name"))?;
                result.push(hex);
                i += 3;
            } else {
                result.push(bytes[i]);
                i += 1;
            }
        }

        String::from_utf8(result).map_err(|_| syntax_error(start, "Invalid UTF-8 in name"))
    }

    fn read_keyword(&mut self) -> Result<Option<Token>> {
        let start = self.position;

        while self.position < self.input.len() {
            let ch = self.input[self.position];
            if is_whitespace(ch) || is_delimiter(ch) {
                break;
            }
            self.position += 1;
        }

        let keyword = std::str::from_utf8(&self.input[start..self.position])
            .map_err(|_| syntax_error(start, "Invalid operator"))?;

        Ok(Some(Token::Keyword(keyword.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &[u8]) -> Vec<Token> {
        let mut tokenizer = ContentTokenizer::new(input);
        let mut tokens = Vec::new();
        while let Some(token) = tokenizer.next_token().unwrap() {
            tokens.push(token);
        }
        tokens
    }

    #[test]
    fn test_ends_inside_value() {
        assert!(ends_inside_value(b"BT (Hello"));
        assert!(ends_inside_value(b"(a (nested) still open"));
        assert!(ends_inside_value(b"<48656C"));
        assert!(ends_inside_value(b"BI /W 1 ID \x01\x02"));

        assert!(!ends_inside_value(b"BT (Hello) Tj"));
        assert!(!ends_inside_value(b"72 700"));
        assert!(!ends_inside_value(b"[1 2"));
        assert!(!ends_inside_value(b"<< /Type"));
        assert!(!ends_inside_value(b"q % open comment"));
        assert!(!ends_inside_value(b""));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens(b"12 -3 +4 1.5 .25 -.5 7."),
            vec![
                Token::Integer(12),
                Token::Integer(-3),
                Token::Integer(4),
                Token::Real(1.5),
                Token::Real(0.25),
                Token::Real(-0.5),
                Token::Real(7.0),
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            tokens(b"(a\\(b\\)) (nested (parens)) (\\101\\n) <48 65 6c6C6f> <7>"),
            vec![
                Token::String(b"a(b)".to_vec()),
                Token::String(b"nested (parens)".to_vec()),
                Token::String(b"A\n".to_vec()),
                Token::String(b"Hello".to_vec()),
                Token::String(vec![0x70]),
            ]
        );
    }

    #[test]
    fn test_names_and_keywords() {
        assert_eq!(
            tokens(b"/F1 12 Tf /A#20B true % comment\nT*"),
            vec![
                Token::Name("F1".into()),
                Token::Integer(12),
                Token::Keyword("Tf".into()),
                Token::Name("A B".into()),
                Token::Keyword("true".into()),
                Token::Keyword("T*".into()),
            ]
        );
    }

    #[test]
    fn test_containers() {
        assert_eq!(
            tokens(b"[1]<</K 2>>"),
            vec![
                Token::ArrayStart,
                Token::Integer(1),
                Token::ArrayEnd,
                Token::DictStart,
                Token::Name("K".into()),
                Token::Integer(2),
                Token::DictEnd,
            ]
        );
    }

    #[test]
    fn test_errors() {
        let mut tokenizer = ContentTokenizer::new(b"(never closed");
        assert!(matches!(
            tokenizer.next_token(),
            Err(PdfError::ParseError { position: 0, .. })
        ));

        let mut tokenizer = ContentTokenizer::new(b"<41 zz>");
        assert!(tokenizer.next_token().is_err());

        let mut tokenizer = ContentTokenizer::new(b"<4142");
        assert!(tokenizer.next_token().is_err());
    }

    #[test]
    fn test_inline_data() {
        let input = b"ID \x00\x01EI\x02 EI Q";
        let mut tokenizer = ContentTokenizer::new(input);
        assert_eq!(tokenizer.next_token().unwrap(), Some(Token::Keyword("ID".into())));
        let data = tokenizer.read_inline_data().unwrap();
        assert_eq!(data, b"\x00\x01EI\x02".to_vec());
        assert_eq!(tokenizer.next_token().unwrap(), Some(Token::Keyword("Q".into())));
    }
}
