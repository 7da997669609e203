//! text/parse: разбор текстового формата обмена.
//!
//! Грамматика записи: '+' klen ',' dlen ':' key(klen байт) '->' data(dlen байт) '\n'.
//! Поток заканчивается одиночным '\n' вместо '+'.
//!
//! Любое отклонение (нет '+', нечисловая длина, нет "->", нет завершающего '\n',
//! конец ввода в любом месте, включая отсутствие терминатора): CdbError::BadFormat.
//! Частичное восстановление не делается: первая ошибка завершает разбор.

use anyhow::Result;
use std::io::{self, BufRead};

use crate::error::CdbError;
use crate::layout::read_exact_vec;
use crate::record::Record;

pub struct TextReader<R> {
    r: R,
    offset: u64,
    done: bool,
}

fn describe_byte(b: u8) -> String {
    if b.is_ascii_graphic() {
        format!("'{}'", b as char)
    } else {
        format!("0x{:02x}", b)
    }
}

impl<R: BufRead> TextReader<R> {
    pub fn new(r: R) -> Self {
        Self {
            r,
            offset: 0,
            done: false,
        }
    }

    /// Сколько байт ввода уже разобрано.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// true, когда встретился терминатор потока.
    pub fn is_finished(&self) -> bool {
        self.done
    }

    pub fn into_inner(self) -> R {
        self.r
    }

    fn eof_error(&self, expected: &str) -> anyhow::Error {
        CdbError::bad_format(format!(
            "unexpected end of input at offset {}, expected {}",
            self.offset, expected
        ))
        .into()
    }

    fn read_byte(&mut self, expected: &str) -> Result<u8> {
        let mut b = [0u8; 1];
        match self.r.read_exact(&mut b) {
            Ok(()) => {
                self.offset += 1;
                Ok(b[0])
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(self.eof_error(expected)),
            Err(e) => Err(anyhow::Error::new(e).context(format!("read input at offset {}", self.offset))),
        }
    }

    fn eat_byte(&mut self, want: u8) -> Result<()> {
        let at = self.offset;
        let what = describe_byte(want);
        let got = self.read_byte(&what)?;
        if got != want {
            return Err(CdbError::bad_format(format!(
                "expected {} at offset {}, found {}",
                what,
                at,
                describe_byte(got)
            ))
            .into());
        }
        Ok(())
    }

    /// Десятичное u32 до разделителя delim (разделитель съедается).
    fn read_num(&mut self, delim: u8) -> Result<u32> {
        let start = self.offset;
        let mut n: u64 = 0;
        let mut digits = 0usize;
        let expected = format!("digit or {}", describe_byte(delim));
        loop {
            let b = self.read_byte(&expected)?;
            if b == delim {
                break;
            }
            if !b.is_ascii_digit() {
                return Err(CdbError::bad_format(format!(
                    "non-numeric length at offset {}: found {}",
                    self.offset - 1,
                    describe_byte(b)
                ))
                .into());
            }
            n = n * 10 + (b - b'0') as u64;
            digits += 1;
            if n > u32::MAX as u64 {
                return Err(CdbError::bad_format(format!(
                    "length at offset {} exceeds {}",
                    start,
                    u32::MAX
                ))
                .into());
            }
        }
        if digits == 0 {
            return Err(CdbError::bad_format(format!("empty length at offset {}", start)).into());
        }
        Ok(n as u32)
    }

    fn read_bytes(&mut self, n: u32, what: &str) -> Result<Vec<u8>> {
        match read_exact_vec(&mut self.r, n) {
            Ok(v) => {
                self.offset += n as u64;
                Ok(v)
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(self.eof_error(&format!("{} of {} byte(s)", what, n)))
            }
            Err(e) => Err(anyhow::Error::new(e).context(format!("read {} at offset {}", what, self.offset))),
        }
    }

    /// Следующая запись; Ok(None): встретился терминатор.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if self.done {
            return Ok(None);
        }
        let at = self.offset;
        match self.read_byte("'+' or end-of-records newline")? {
            b'\n' => {
                self.done = true;
                return Ok(None);
            }
            b'+' => {}
            other => {
                return Err(CdbError::bad_format(format!(
                    "expected '+' at offset {}, found {}",
                    at,
                    describe_byte(other)
                ))
                .into())
            }
        }

        let klen = self.read_num(b',')?;
        let dlen = self.read_num(b':')?;
        let key = self.read_bytes(klen, "key")?;
        self.eat_byte(b'-')?;
        self.eat_byte(b'>')?;
        let data = self.read_bytes(dlen, "data")?;
        self.eat_byte(b'\n')?;

        Ok(Some(Record { key, data }))
    }
}

impl<R: BufRead> Iterator for TextReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(rec)) => Some(Ok(rec)),
            Ok(None) => None,
            Err(e) => {
                // после ошибки поток не продолжаем
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Разобрать весь текст в память.
pub fn parse_all<R: BufRead>(r: R) -> Result<Vec<Record>> {
    TextReader::new(r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_bad_format;

    fn parse(s: &[u8]) -> Result<Vec<Record>> {
        parse_all(s)
    }

    #[test]
    fn parses_records_and_terminator() {
        let recs = parse(b"+3,3:foo->bar\n+3,3:baz->qux\n\n").unwrap();
        assert_eq!(
            recs,
            vec![Record::new("foo", "bar"), Record::new("baz", "qux")]
        );
    }

    #[test]
    fn empty_stream() {
        assert!(parse(b"\n").unwrap().is_empty());
    }

    #[test]
    fn binary_and_empty_fields() {
        let mut input = b"+0,0:->\n+2,4:".to_vec();
        input.extend_from_slice(&[0, b'\n']);
        input.extend_from_slice(b"->");
        input.extend_from_slice(&[b'-', b'>', 0xFF, b'\n']);
        input.extend_from_slice(b"\n\n");
        let recs = parse(&input).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0], Record::new("", ""));
        assert_eq!(recs[1].key, vec![0, b'\n']);
        assert_eq!(recs[1].data, vec![b'-', b'>', 0xFF, b'\n']);
    }

    #[test]
    fn trailing_bytes_after_terminator_are_not_read() {
        let mut r = TextReader::new(&b"+1,1:a->b\n\ngarbage"[..]);
        assert!(r.next_record().unwrap().is_some());
        assert!(r.next_record().unwrap().is_none());
        assert!(r.is_finished());
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn malformed_inputs() {
        let cases: &[&[u8]] = &[
            b"+3,3:foo-bar\n",      // нет '>'
            b"3,3:foo->bar\n\n",    // нет '+'
            b"+x,3:foo->bar\n\n",   // нечисловая длина
            b"+,3:foo->bar\n\n",    // пустая длина
            b"+3;3:foo->bar\n\n",   // неверный разделитель
            b"+3,3:foo->barX\n",    // нет завершающего '\n'
            b"+3,3:foo->ba",        // обрыв данных
            b"+3,3:foo->bar\n",     // нет терминатора
            b"",                    // пустой ввод
            b"+99999999999,1:a->b\n\n", // длина больше u32
            b"+-1,1:a->b\n\n",
        ];
        for c in cases {
            let err = parse(c).unwrap_err();
            assert!(
                is_bad_format(&err),
                "input {:?} must be bad format, got: {:#}",
                String::from_utf8_lossy(c),
                err
            );
        }
    }

    #[test]
    fn iterator_stops_after_error() {
        let mut r = TextReader::new(&b"+1,1:a->b\n?"[..]);
        assert!(r.next().unwrap().is_ok());
        assert!(r.next().unwrap().is_err());
        assert!(r.next().is_none());
    }

    #[test]
    fn offset_tracks_input() {
        let mut r = TextReader::new(&b"+1,2:a->bc\n\n"[..]);
        r.next_record().unwrap();
        assert_eq!(r.offset(), 11);
    }
}
