//! Content stream operations
//!
//! Splits content stream bytes into a flat list of [`Operation`]s and writes
//! them back. Operands left over at the end of the input, with no operator to
//! consume them, are kept in [`ParsedContent::trailing`]; a page body whose
//! stream ends that way continues in the next stream.
//!
//! Inline images (`BI ... ID ... EI`) become a single `BI` operation whose
//! operands are the image dictionary and the raw image data.

mod tokenizer;

use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object};
pub(crate) use tokenizer::ends_inside_value;
use tokenizer::{ContentTokenizer, Token};
use tracing::warn;

/// Deepest array/dictionary nesting accepted inside a content stream
pub const MAX_OPERAND_DEPTH: usize = 256;

/// One operator with the operands preceding it
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub operator: String,
    pub operands: Vec<Object>,
}

impl Operation {
    pub fn new(operator: impl Into<String>, operands: Vec<Object>) -> Self {
        Self {
            operator: operator.into(),
            operands,
        }
    }

    pub fn is_inline_image(&self) -> bool {
        self.operator == "BI"
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        if self.is_inline_image() {
            if let [Object::Dictionary(dict), Object::String(data)] = self.operands.as_slice() {
                out.extend_from_slice(b"BI");
                for (key, value) in dict.iter() {
                    out.push(b' ');
                    write_name(key, out);
                    out.push(b' ');
                    write_object(value, out);
                }
                out.extend_from_slice(b" ID ");
                out.extend_from_slice(data);
                out.extend_from_slice(b"\nEI");
                return;
            }
        }

        for operand in &self.operands {
            write_object(operand, out);
            out.push(b' ');
        }
        out.extend_from_slice(self.operator.as_bytes());
    }
}

/// Result of parsing one run of content bytes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedContent {
    pub operations: Vec<Operation>,
    /// Operands after the last operator
    pub trailing: Vec<Object>,
}

impl ParsedContent {
    /// True when every operand was consumed by an operator.
    pub fn is_complete(&self) -> bool {
        self.trailing.is_empty()
    }
}

/// Content stream parser
pub struct ContentParser<'a> {
    tokenizer: ContentTokenizer<'a>,
}

impl<'a> ContentParser<'a> {
    pub fn parse(content: &'a [u8]) -> Result<ParsedContent> {
        let mut parser = Self {
            tokenizer: ContentTokenizer::new(content),
        };
        parser.parse_operations()
    }

    fn parse_operations(&mut self) -> Result<ParsedContent> {
        let mut parsed = ParsedContent::default();
        let mut operands = Vec::new();

        while let Some(token) = self.tokenizer.next_token()? {
            match token {
                Token::Keyword(keyword) => match keyword.as_str() {
                    "true" => operands.push(Object::Boolean(true)),
                    "false" => operands.push(Object::Boolean(false)),
                    "null" => operands.push(Object::Null),
                    "BI" => {
                        if !operands.is_empty() {
                            warn!(
                                "dropping {} operands before inline image at {}",
                                operands.len(),
                                self.tokenizer.position()
                            );
                            operands.clear();
                        }
                        parsed.operations.push(self.read_inline_image()?);
                    }
                    _ => parsed
                        .operations
                        .push(Operation::new(keyword, std::mem::take(&mut operands))),
                },
                other => operands.push(self.read_object(other, 0)?),
            }
        }

        parsed.trailing = operands;
        Ok(parsed)
    }

    fn read_object(&mut self, token: Token, depth: usize) -> Result<Object> {
        if depth > MAX_OPERAND_DEPTH {
            return Err(self.error(format!(
                "operand nesting deeper than {MAX_OPERAND_DEPTH}"
            )));
        }

        match token {
            Token::Integer(i) => Ok(Object::Integer(i)),
            Token::Real(r) => Ok(Object::Real(r)),
            Token::String(s) => Ok(Object::String(s)),
            Token::Name(n) => Ok(Object::Name(n)),
            Token::Keyword(keyword) => Ok(match keyword.as_str() {
                "true" => Object::Boolean(true),
                "false" => Object::Boolean(false),
                "null" => Object::Null,
                _ => Object::Command(keyword),
            }),
            Token::ArrayStart => {
                let mut items = Vec::new();
                loop {
                    match self.tokenizer.next_token()? {
                        Some(Token::ArrayEnd) => return Ok(Object::Array(items)),
                        Some(token) => items.push(self.read_object(token, depth + 1)?),
                        None => return Err(self.error("Unterminated array")),
                    }
                }
            }
            Token::DictStart => {
                let mut dict = Dictionary::new();
                loop {
                    match self.tokenizer.next_token()? {
                        Some(Token::DictEnd) => return Ok(Object::Dictionary(dict)),
                        Some(Token::Name(key)) => {
                            let value = match self.tokenizer.next_token()? {
                                Some(token) => self.read_object(token, depth + 1)?,
                                None => return Err(self.error("Unterminated dictionary")),
                            };
                            dict.set(key, value);
                        }
                        Some(_) => return Err(self.error("Dictionary key must be a name")),
                        None => return Err(self.error("Unterminated dictionary")),
                    }
                }
            }
            Token::ArrayEnd => Err(self.error("Unexpected ']'")),
            Token::DictEnd => Err(self.error("Unexpected '>>'")),
        }
    }

    fn read_inline_image(&mut self) -> Result<Operation> {
        let mut dict = Dictionary::new();
        loop {
            match self.tokenizer.next_token()? {
                Some(Token::Keyword(keyword)) if keyword == "ID" => break,
                Some(Token::Name(key)) => {
                    let value = match self.tokenizer.next_token()? {
                        Some(token) => self.read_object(token, 1)?,
                        None => return Err(self.error("Unterminated inline image")),
                    };
                    dict.set(key, value);
                }
                Some(_) => return Err(self.error("Inline image key must be a name")),
                None => return Err(self.error("Unterminated inline image")),
            }
        }

        let data = self.tokenizer.read_inline_data()?;
        Ok(Operation::new(
            "BI",
            vec![Object::Dictionary(dict), Object::String(data)],
        ))
    }

    fn error(&self, message: impl Into<String>) -> PdfError {
        PdfError::ParseError {
            position: self.tokenizer.position(),
            message: message.into(),
        }
    }
}

/// Serializes `operations`, one per line.
pub fn write_operations(operations: &[Operation]) -> Vec<u8> {
    let mut out = Vec::new();
    for operation in operations {
        operation.write_to(&mut out);
        out.push(b'\n');
    }
    out
}

/// Writes `object` in content stream syntax.
pub fn write_object(object: &Object, out: &mut Vec<u8>) {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Object::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Object::Real(f) => {
            let text = format!("{f:.6}");
            let text = text.trim_end_matches('0').trim_end_matches('.');
            let text = match text {
                "" | "-" => "0",
                text => text,
            };
            out.extend_from_slice(text.as_bytes());
        }
        Object::String(s) => {
            out.push(b'(');
            for &byte in s {
                match byte {
                    b'(' | b')' | b'\\' => {
                        out.push(b'\\');
                        out.push(byte);
                    }
                    b'\n' => out.extend_from_slice(b"\\n"),
                    b'\r' => out.extend_from_slice(b"\\r"),
                    _ => out.push(byte),
                }
            }
            out.push(b')');
        }
        Object::Name(n) => write_name(n, out),
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(item, out);
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => write_dictionary(dict, out),
        // streams cannot appear inline, only their dictionary is kept
        Object::Stream(stream) => write_dictionary(stream.dictionary(), out),
        Object::Command(command) => out.extend_from_slice(command.as_bytes()),
        Object::Reference(id) => out.extend_from_slice(id.to_string().as_bytes()),
    }
}

fn write_dictionary(dict: &Dictionary, out: &mut Vec<u8>) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        out.push(b' ');
        write_name(key, out);
        out.push(b' ');
        write_object(value, out);
    }
    out.extend_from_slice(b" >>");
}

fn write_name(name: &str, out: &mut Vec<u8>) {
    out.push(b'/');
    for &byte in name.as_bytes() {
        let plain = byte.is_ascii_graphic()
            && !matches!(
                byte,
                b'#' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
            );
        if plain {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("#{byte:02X}").as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_simple_operations() {
        let parsed = ContentParser::parse(b"q 1 0 0 1 50 50 cm /F1 12 Tf (Hi) Tj Q").unwrap();
        assert!(parsed.is_complete());
        let operators: Vec<_> = parsed.operations.iter().map(|op| op.operator.as_str()).collect();
        assert_eq!(operators, vec!["q", "cm", "Tf", "Tj", "Q"]);
        assert_eq!(parsed.operations[1].operands.len(), 6);
        assert_eq!(
            parsed.operations[2].operands,
            vec![Object::Name("F1".into()), Object::Integer(12)]
        );
    }

    #[test]
    fn test_parse_array_and_dict_operands() {
        let parsed =
            ContentParser::parse(b"[(A) -120 (B)] TJ /OC <</MCID 3 /On true>> BDC EMC").unwrap();
        assert_eq!(
            parsed.operations[0].operands,
            vec![Object::Array(vec![
                Object::String(b"A".to_vec()),
                Object::Integer(-120),
                Object::String(b"B".to_vec()),
            ])]
        );
        let props = parsed.operations[1].operands[1].as_dict().unwrap();
        assert_eq!(props.get("MCID"), Some(&Object::Integer(3)));
        assert_eq!(props.get("On"), Some(&Object::Boolean(true)));
    }

    #[test]
    fn test_trailing_operands() {
        let parsed = ContentParser::parse(b"0 0 m 100 100").unwrap();
        assert!(!parsed.is_complete());
        assert_eq!(parsed.operations.len(), 1);
        assert_eq!(parsed.trailing, vec![Object::Integer(100), Object::Integer(100)]);
    }

    #[test]
    fn test_inline_image() {
        let parsed = ContentParser::parse(b"q BI /W 2 /H 1 /BPC 8 ID \x01\x02\nEI Q").unwrap();
        let operators: Vec<_> = parsed.operations.iter().map(|op| op.operator.as_str()).collect();
        assert_eq!(operators, vec!["q", "BI", "Q"]);

        let image = &parsed.operations[1];
        assert!(image.is_inline_image());
        assert_eq!(image.operands[0].as_dict().unwrap().get("W"), Some(&Object::Integer(2)));
        assert_eq!(image.operands[1], Object::String(vec![1, 2]));
    }

    #[test]
    fn test_unterminated_array_is_an_error() {
        assert!(matches!(
            ContentParser::parse(b"[1 2"),
            Err(PdfError::ParseError { .. })
        ));
        assert!(ContentParser::parse(b"1 ] m").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let mut input = vec![b'['; MAX_OPERAND_DEPTH + 2];
        input.extend(vec![b']'; MAX_OPERAND_DEPTH + 2]);
        assert!(ContentParser::parse(&input).is_err());
    }

    #[test]
    fn test_write_then_parse() {
        let source = b"q 0.5 g /Im#201 Do (a\\(b) Tj BI /W 1 /H 1 ID \xff\nEI Q";
        let parsed = ContentParser::parse(source).unwrap();
        let written = write_operations(&parsed.operations);
        let reparsed = ContentParser::parse(&written).unwrap();
        assert_eq!(parsed, reparsed);
    }

    #[test]
    fn test_write_object_formats() {
        let mut out = Vec::new();
        write_object(&Object::Real(1.250), &mut out);
        out.push(b' ');
        write_object(&Object::Name("A B".into()), &mut out);
        out.push(b' ');
        write_object(&Object::Null, &mut out);
        assert_eq!(String::from_utf8(out).unwrap(), "1.25 /A#20B null");
    }

    #[test]
    fn test_write_whole_and_zero_reals() {
        let mut out = Vec::new();
        for value in [0.0, -0.0, 100.0, -2.5] {
            write_object(&Object::Real(value), &mut out);
            out.push(b' ');
        }
        assert_eq!(String::from_utf8(out).unwrap(), "0 0 100 -2.5 ");
    }
}
