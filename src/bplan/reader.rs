use crate::bplan::error::{Error, LineError};
use crate::bplan::structs::{Action, RecordType};

use csv::{ByteRecord, StringRecord};
use encoding_rs::WINDOWS_1252;
use flate2::read::MultiGzDecoder;
use serde::de::DeserializeOwned;
use std::{fs::File, io::BufReader, io::Read, path::Path};

/// A single line of a BPLAN file, split on tabs and decoded.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Line number in the file, starting at 1
    pub line: u64,
    pub fields: StringRecord,
}

impl RawRecord {
    /// Record type of the line, checked against the known ones.
    pub fn record_type(&self) -> Result<RecordType, Error> {
        let code = self.fields.get(0).unwrap_or_default();
        RecordType::from_code(code).ok_or_else(|| Error::UnknownRecordType {
            line: self.line,
            record_type: code.to_owned(),
        })
    }

    /// Only inserts can be loaded, anything else is rejected.
    pub fn check_action(&self, record_type: RecordType) -> Result<(), Error> {
        if !record_type.has_action() {
            return Ok(());
        }
        let code = self.fields.get(1).unwrap_or_default();
        match Action::from_code(code) {
            Some(Action::Insert) => Ok(()),
            _ => Err(Error::UnsupportedAction {
                line: self.line,
                record_type: record_type.to_string(),
                action: code.to_owned(),
            }),
        }
    }

    /// Fields after the record type and action.
    pub fn payload(&self, record_type: RecordType) -> impl Iterator<Item = &str> {
        self.fields.iter().skip(record_type.payload_offset())
    }

    /// Convert the payload into its typed record.
    pub fn deserialize<O>(&self, record_type: RecordType, headers: &StringRecord) -> Result<O, Error>
    where
        O: DeserializeOwned,
    {
        let payload: StringRecord = self.payload(record_type).collect();
        if payload.len() != headers.len() {
            return Err(Error::FieldCount {
                line: self.line,
                record_type: record_type.to_string(),
                expected: headers.len(),
                found: payload.len(),
            });
        }

        payload
            .deserialize(Some(headers))
            .map_err(|e| Error::InvalidRecord {
                line: self.line,
                record_type: record_type.to_string(),
                source: e,
                line_in_error: LineError {
                    headers: headers.into_iter().map(String::from).collect(),
                    values: payload.into_iter().map(String::from).collect(),
                },
            })
    }
}

/// Streams the records of a BPLAN file.
///
/// BPLAN files are tab separated, CRLF terminated, unquoted and encoded in
/// Windows-1252. Tabs and line terminators are the same bytes in ASCII, so
/// lines are split first and each field decoded afterwards. Splitting on LF
/// alone keeps csv line positions right for CRLF input; blank lines are skipped.
pub struct BplanReader<R: Read> {
    file_name: String,
    reader: csv::Reader<R>,
    // Pre-allocate a ByteRecord for performance reasons
    buffer: ByteRecord,
}

impl BplanReader<Box<dyn Read>> {
    /// Open a BPLAN file, transparently decompressing it if it ends in `.gz`.
    pub fn open<P>(path: P) -> Result<BplanReader<Box<dyn Read>>, Error>
    where
        P: AsRef<Path>,
    {
        let p = path.as_ref();
        let file_name = format!("{}", p.display());
        let file = File::open(p).map_err(|e| Error::NamedFileIO {
            file_name: file_name.clone(),
            source: e,
        })?;

        // Concatenated gzip members are read as one stream
        let is_gzip = p
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);
        let reader: Box<dyn Read> = if is_gzip {
            log::debug!("Reading {} as gzip", file_name);
            Box::new(MultiGzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(file)
        };
        Ok(BplanReader::from_reader(reader, &file_name))
    }
}

impl<R: Read> BplanReader<R> {
    pub fn from_reader(reader: R, file_name: &str) -> BplanReader<R> {
        let reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .terminator(csv::Terminator::Any(b'\n'))
            .has_headers(false)
            .quoting(false)
            .flexible(true)
            .trim(csv::Trim::None)
            .from_reader(reader);
        BplanReader {
            file_name: file_name.to_owned(),
            reader,
            buffer: ByteRecord::new(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Read the next record, `None` at the end of the file.
    pub fn read_record(&mut self) -> Result<Option<RawRecord>, Error> {
        loop {
            let more = self
                .reader
                .read_byte_record(&mut self.buffer)
                .map_err(|e| Error::CSVError {
                    file_name: self.file_name.clone(),
                    source: e,
                })?;
            if !more {
                return Ok(None);
            }

            let line = self.buffer.position().map(|p| p.line()).unwrap_or_default();
            let last = self.buffer.len().saturating_sub(1);
            let fields = self
                .buffer
                .iter()
                .enumerate()
                .map(|(i, field)| {
                    // Lines are split on LF only, the CR stays on the last field
                    let field = match field.split_last() {
                        Some((b'\r', rest)) if i == last => rest,
                        _ => field,
                    };
                    WINDOWS_1252.decode_without_bom_handling(field).0
                })
                .collect::<StringRecord>();

            if fields.len() == 1 && fields[0].is_empty() {
                continue;
            }
            return Ok(Some(RawRecord { line, fields }));
        }
    }
}

impl<R: Read> Iterator for BplanReader<R> {
    type Item = Result<RawRecord, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bplan::structs::ReferenceCode;

    fn reader(data: &[u8]) -> BplanReader<&[u8]> {
        BplanReader::from_reader(data, "test")
    }

    #[test]
    fn test_split_crlf_lines() {
        let records = reader(b"REF\tA\tPWR\tD\tDiesel\r\nREF\tA\tPWR\tE\tElectric\r\n")
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, 1);
        assert_eq!(records[1].line, 2);
        assert_eq!(&records[1].fields[4], "Electric");
    }

    #[test]
    fn test_crlf_line_numbers() {
        let lines = reader(b"A\t1\r\nB\t2\r\nC\t3\r\nD\t4\r\n")
            .map(|r| r.unwrap().line)
            .collect::<Vec<_>>();
        assert_eq!(lines, vec![1, 2, 3, 4]);

        let lines = reader(b"A\t1\nB\t2\nC\t3\nD\t4\n")
            .map(|r| r.unwrap().line)
            .collect::<Vec<_>>();
        assert_eq!(lines, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_carriage_return_not_in_last_field() {
        let records = reader(b"LOC\tA\tABWD\t\r\nREF\tA\tPWR\tD\tDiesel\r\n")
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(records[0].fields.len(), 4);
        assert_eq!(&records[0].fields[3], "");
        assert_eq!(&records[1].fields[4], "Diesel");
    }

    #[test]
    fn test_blank_lines_skipped() {
        let records = reader(b"REF\tA\tPWR\tD\tDiesel\r\n\r\nREF\tA\tPWR\tE\tElectric\r\n")
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].line, 3);
    }

    #[test]
    fn test_quotes_are_literal() {
        let records = reader(b"REF\tA\tZNE\tZ1\t\"Zone\" one\r\n")
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(&records[0].fields[4], "\"Zone\" one");
    }

    #[test]
    fn test_windows_1252_decoding() {
        // 0xA3 is the pound sign and 0x96 an en dash in Windows-1252
        let records = reader(b"REF\tA\tXXX\tP\t\xa3 \x96 cost\r\n")
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(&records[0].fields[4], "\u{a3} \u{2013} cost");
    }

    #[test]
    fn test_unknown_record_type() {
        let record = reader(b"XYZ\tA\t1\r\n").next().unwrap().unwrap();
        assert!(matches!(
            record.record_type(),
            Err(Error::UnknownRecordType { line: 1, .. })
        ));
    }

    #[test]
    fn test_unsupported_action() {
        let record = reader(b"LOC\tD\tABWD\r\n").next().unwrap().unwrap();
        let record_type = record.record_type().unwrap();
        assert!(matches!(
            record.check_action(record_type),
            Err(Error::UnsupportedAction { .. })
        ));

        let header = reader(b"PIF\t1.0\r\n").next().unwrap().unwrap();
        assert!(header.check_action(RecordType::Pif).is_ok());
    }

    #[test]
    fn test_deserialize_payload() {
        let record = reader(b"REF\tA\tPWR\tD\tDiesel\r\n").next().unwrap().unwrap();
        let code: ReferenceCode = record
            .deserialize(RecordType::Ref, &RecordType::Ref.headers())
            .unwrap();
        assert_eq!(code.code_type, "PWR");
        assert_eq!(code.description, "Diesel");
    }

    #[test]
    fn test_field_count() {
        let record = reader(b"REF\tA\tPWR\tD\r\n").next().unwrap().unwrap();
        let res: Result<ReferenceCode, _> =
            record.deserialize(RecordType::Ref, &RecordType::Ref.headers());
        assert!(matches!(
            res,
            Err(Error::FieldCount { expected: 3, found: 2, .. })
        ));
    }

    #[test]
    fn test_invalid_field_keeps_line() {
        let data = b"TLD\tA\tD\t1000\tfast\tW6\tDiesel\tD\t1000\t75\r\n";
        let record = reader(data).next().unwrap().unwrap();
        let res: Result<crate::bplan::structs::TimingLoad, _> =
            record.deserialize(RecordType::Tld, &RecordType::Tld.headers());
        match res {
            Err(Error::InvalidRecord { line, line_in_error, .. }) => {
                assert_eq!(line, 1);
                assert_eq!(line_in_error.values[2], "fast");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
