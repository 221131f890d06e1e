use super::BencodeValue;
use crate::error::{BittorrentError, Result};
use std::collections::BTreeMap;

/// Decode a complete bencoded document. Trailing bytes after the first value are an error.
pub fn decode(data: &[u8]) -> Result<BencodeValue> {
    let mut decoder = Decoder { data, pos: 0 };
    let value = decoder.value()?;

    if decoder.pos != data.len() {
        return Err(bencode_error(format!(
            "{} trailing bytes after value",
            data.len() - decoder.pos
        )));
    }

    Ok(value)
}

fn bencode_error(msg: impl Into<String>) -> BittorrentError {
    BittorrentError::BencodeError(msg.into())
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn peek(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| bencode_error("Unexpected end of input"))
    }

    fn value(&mut self) -> Result<BencodeValue> {
        match self.peek()? {
            b'i' => self.integer(),
            b'l' => self.list(),
            b'd' => self.dict(),
            b'0'..=b'9' => self.bytes().map(BencodeValue::Bytes),
            c => Err(bencode_error(format!(
                "Invalid token '{}' at offset {}",
                c as char, self.pos
            ))),
        }
    }

    /// Consume bytes up to (not including) `delim` and return them, skipping the delimiter
    fn take_until(&mut self, delim: u8) -> Result<&'a [u8]> {
        let data: &'a [u8] = self.data;
        let rest = &data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == delim)
            .ok_or_else(|| bencode_error(format!("Missing '{}' delimiter", delim as char)))?;

        self.pos += len + 1;
        Ok(&rest[..len])
    }

    fn integer(&mut self) -> Result<BencodeValue> {
        self.pos += 1; // 'i'
        let digits = self.take_until(b'e')?;

        let text = std::str::from_utf8(digits).map_err(|_| bencode_error("Invalid integer"))?;
        let canonical = match text.as_bytes() {
            [] | [b'-'] => false,
            [b'-', b'0', ..] => false,
            [b'0', _, ..] => false,
            _ => true,
        };
        if !canonical {
            return Err(bencode_error(format!("Non-canonical integer '{}'", text)));
        }

        text.parse::<i64>()
            .map(BencodeValue::Integer)
            .map_err(|_| bencode_error(format!("Invalid integer '{}'", text)))
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let len_digits = self.take_until(b':')?;
        let len = std::str::from_utf8(len_digits)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| bencode_error("Invalid string length"))?;

        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| bencode_error("String length exceeds data"))?;

        let bytes = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(bytes)
    }

    fn list(&mut self) -> Result<BencodeValue> {
        self.pos += 1; // 'l'
        let mut list = Vec::new();

        while self.peek()? != b'e' {
            list.push(self.value()?);
        }
        self.pos += 1;

        Ok(BencodeValue::List(list))
    }

    fn dict(&mut self) -> Result<BencodeValue> {
        self.pos += 1; // 'd'
        let mut dict = BTreeMap::new();

        while self.peek()? != b'e' {
            if !self.peek()?.is_ascii_digit() {
                return Err(bencode_error("Dictionary key must be a string"));
            }
            let key = self.bytes()?;
            let value = self.value()?;
            dict.insert(key, value);
        }
        self.pos += 1;

        Ok(BencodeValue::Dict(dict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_nested() {
        let value = decode(b"d4:infod6:lengthi42ee4:listl3:abci-7eee").unwrap();

        assert_eq!(value.get(b"info").and_then(|i| i.get(b"length")).and_then(|v| v.as_integer()), Some(42));
        let list = value.get(b"list").and_then(|v| v.as_list()).unwrap();
        assert_eq!(list[0].as_str(), Some("abc"));
        assert_eq!(list[1].as_integer(), Some(-7));
    }

    #[test]
    fn test_binary_string() {
        let value = decode(b"3:\x00\xff\x10").unwrap();
        assert_eq!(value.as_bytes(), Some(&[0x00, 0xff, 0x10][..]));
        assert_eq!(value.as_str(), None);
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(decode(b"").is_err());
        assert!(decode(b"i42").is_err());
        assert!(decode(b"i-0e").is_err());
        assert!(decode(b"i042e").is_err());
        assert!(decode(b"ie").is_err());
        assert!(decode(b"5:abc").is_err());
        assert!(decode(b"l3:abc").is_err());
        assert!(decode(b"di1ei2ee").is_err());
        assert!(decode(b"i1ei2e").is_err());
        assert!(decode(b"x").is_err());
    }

    #[test]
    fn test_zero_is_canonical() {
        assert_eq!(decode(b"i0e").unwrap().as_integer(), Some(0));
    }
}
