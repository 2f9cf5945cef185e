use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object};
use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    dictionary: Dictionary,
    data: Vec<u8>,
}

impl Stream {
    pub fn new(data: Vec<u8>) -> Self {
        let mut dictionary = Dictionary::new();
        dictionary.set("Length", data.len() as i64);

        Self { dictionary, data }
    }

    pub fn with_dictionary(dictionary: Dictionary, data: Vec<u8>) -> Self {
        let mut dict = dictionary;
        dict.set("Length", data.len() as i64);

        Self {
            dictionary: dict,
            data,
        }
    }

    /// Builds a stream without touching `Length`.
    pub(crate) fn from_parts(dictionary: Dictionary, data: Vec<u8>) -> Self {
        Self { dictionary, data }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn dictionary_mut(&mut self) -> &mut Dictionary {
        &mut self.dictionary
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn set_data(&mut self, data: Vec<u8>) {
        self.dictionary.set("Length", data.len() as i64);
        self.data = data;
    }

    pub fn set_filter(&mut self, filter: &str) {
        self.dictionary.set("Filter", Object::Name(filter.to_string()));
    }

    /// Names of the filters applied to the raw data, outermost first.
    pub fn filters(&self) -> Vec<&str> {
        match self.dictionary.get("Filter") {
            Some(Object::Name(name)) => vec![name.as_str()],
            Some(Object::Array(names)) => names.iter().filter_map(Object::as_name).collect(),
            _ => Vec::new(),
        }
    }

    /// Stream data with every filter removed.
    pub fn decoded_data(&self) -> Result<Cow<'_, [u8]>> {
        let filters = self.filters();
        if filters.is_empty() {
            return Ok(Cow::Borrowed(&self.data));
        }

        let mut data = self.data.clone();
        for filter in filters {
            data = match filter {
                #[cfg(feature = "compression")]
                "FlateDecode" | "Fl" => inflate(&data)?,
                other => {
                    return Err(PdfError::CompressionError(format!(
                        "unsupported stream filter: {other}"
                    )))
                }
            };
        }
        Ok(Cow::Owned(data))
    }

    #[cfg(feature = "compression")]
    pub fn compress_flate(&mut self) -> Result<()> {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&self.data)
            .map_err(|e| PdfError::CompressionError(e.to_string()))?;
        let compressed = encoder
            .finish()
            .map_err(|e| PdfError::CompressionError(e.to_string()))?;

        self.set_data(compressed);
        self.set_filter("FlateDecode");

        Ok(())
    }
}

#[cfg(feature = "compression")]
fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| PdfError::CompressionError(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sets_length() {
        let stream = Stream::new(b"BT ET".to_vec());
        assert_eq!(stream.dictionary().get("Length"), Some(&Object::Integer(5)));
        assert!(stream.filters().is_empty());
    }

    #[test]
    fn test_set_data_updates_length() {
        let mut stream = Stream::new(Vec::new());
        stream.set_data(b"0 0 m 10 10 l S".to_vec());
        assert_eq!(stream.dictionary().get("Length"), Some(&Object::Integer(15)));
    }

    #[test]
    fn test_decoded_data_without_filter_borrows() {
        let stream = Stream::new(b"q Q".to_vec());
        assert!(matches!(stream.decoded_data().unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_unknown_filter_is_an_error() {
        let mut stream = Stream::new(b"abc".to_vec());
        stream.set_filter("LZWDecode");
        assert!(matches!(
            stream.decoded_data(),
            Err(PdfError::CompressionError(_))
        ));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_flate_decode() {
        let mut stream = Stream::new(b"1 0 0 1 50 50 cm".to_vec());
        stream.compress_flate().unwrap();
        assert_eq!(stream.filters(), vec!["FlateDecode"]);
        assert_eq!(&*stream.decoded_data().unwrap(), b"1 0 0 1 50 50 cm");
    }
}
