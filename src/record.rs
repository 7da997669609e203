use crate::consts::REC_HDR_SIZE;

/// One stored (key, data) pair.
///
/// Keys and data are raw bytes; both may be empty. Duplicate keys are allowed,
/// every copy is stored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    pub key: Vec<u8>,
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            data: data.into(),
        }
    }

    /// Размер записи на диске: [klen u32][dlen u32][key][data].
    #[inline]
    pub fn encoded_len(&self) -> u64 {
        REC_HDR_SIZE as u64 + self.key.len() as u64 + self.data.len() as u64
    }
}

impl<K: Into<Vec<u8>>, D: Into<Vec<u8>>> From<(K, D)> for Record {
    fn from((key, data): (K, D)) -> Self {
        Record::new(key, data)
    }
}
