#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn new(offset: u64, length: Option<u64>) -> Self {
        Self { offset, length }
    }

    pub fn to_http_range(&self) -> String {
        match self.length {
            Some(length) if length > 0 => {
                format!("bytes={}-{}", self.offset, self.offset + length - 1)
            }
            _ => format!("bytes={}-", self.offset),
        }
    }
}
