//! Full-video analysis response format.
//!
//! The body is CSV: one header row, then one `time,deepfake_probability` row
//! per analysed timestamp.

use csv::{Position, StringRecord, Trim};
use serde::Serialize;

use crate::error::{ProtocolError, Result};
use crate::MAX_PROBABILITY;

/// Header emitted by the video inference endpoint.
pub const BATCH_HEADER: &str = "time,deepfake_probability";

const TIME_COLUMN: &str = "time";
const PROBABILITY_COLUMN: &str = "deepfake_probability";

/// One analysed timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRow {
    pub time: f64,
    pub deepfake_probability: f64,
}

/// Parsed full-video result with its averaged verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub rows: Vec<BatchRow>,
    /// Mean probability across all rows, `None` when there are no rows.
    pub average: Option<f64>,
}

impl BatchReport {
    pub fn parse(body: &str) -> Result<Self> {
        let rows = parse_batch_csv(body)?;
        let average = average_probability(&rows);
        Ok(Self { rows, average })
    }
}

/// Parse a batch response body.
///
/// All-or-nothing: any malformed row fails the whole body so callers never
/// apply a partial series. Blank lines are skipped and column order follows
/// the header.
pub fn parse_batch_csv(body: &str) -> Result<Vec<BatchRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .trim(Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader.headers().map_err(from_csv)?;
    if headers.is_empty() {
        return Err(ProtocolError::EmptyBatch);
    }
    let columns = Columns::locate(headers)?;

    reader
        .records()
        .map(|record| {
            let record = record.map_err(from_csv)?;
            columns.row(&record)
        })
        .collect()
}

/// Mean probability of the rows, `None` for an empty series.
pub fn average_probability(rows: &[BatchRow]) -> Option<f64> {
    if rows.is_empty() {
        return None;
    }
    let sum: f64 = rows.iter().map(|r| r.deepfake_probability).sum();
    Some(sum / rows.len() as f64)
}

/// Field positions of the two expected columns.
struct Columns {
    time: usize,
    probability: usize,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        match (headers.len(), find(TIME_COLUMN), find(PROBABILITY_COLUMN)) {
            (2, Some(time), Some(probability)) => Ok(Self { time, probability }),
            _ => Err(ProtocolError::BatchHeader {
                found: headers.iter().collect::<Vec<_>>().join(","),
            }),
        }
    }

    fn row(&self, record: &StringRecord) -> Result<BatchRow> {
        let line = line_of(record.position());
        let time = parse_number(line, TIME_COLUMN, record.get(self.time))?;
        let deepfake_probability =
            parse_number(line, PROBABILITY_COLUMN, record.get(self.probability))?;
        if !(0.0..=MAX_PROBABILITY).contains(&deepfake_probability) {
            return Err(malformed(
                line,
                format!("probability {deepfake_probability} is outside 0-100"),
            ));
        }
        Ok(BatchRow {
            time,
            deepfake_probability,
        })
    }
}

fn parse_number(line: usize, column: &str, raw: Option<&str>) -> Result<f64> {
    let raw = raw.unwrap_or_default();
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(malformed(line, format!("{column} {raw:?} is not a number"))),
    }
}

fn line_of(position: Option<&Position>) -> usize {
    position.map_or(0, |p| usize::try_from(p.line()).unwrap_or(usize::MAX))
}

fn from_csv(e: csv::Error) -> ProtocolError {
    malformed(line_of(e.position()), e.to_string())
}

fn malformed(line: usize, reason: String) -> ProtocolError {
    ProtocolError::MalformedBatchLine { line, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_in_order_and_averages() {
        let body = "time,deepfake_probability\n0.0,10\n1.0,80\n2.0,90";
        let report = BatchReport::parse(body).unwrap();
        assert_eq!(
            report.rows,
            vec![
                BatchRow { time: 0.0, deepfake_probability: 10.0 },
                BatchRow { time: 1.0, deepfake_probability: 80.0 },
                BatchRow { time: 2.0, deepfake_probability: 90.0 },
            ]
        );
        assert_eq!(report.average, Some(60.0));
    }

    #[test]
    fn tolerates_crlf_and_trailing_newline() {
        let body = "time,deepfake_probability\r\n0.5,20\r\n1.5,40\r\n";
        let rows = parse_batch_csv(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].time, 1.5);
    }

    #[test]
    fn follows_header_column_order() {
        let body = "deepfake_probability,time\n55,3.0";
        let rows = parse_batch_csv(body).unwrap();
        assert_eq!(rows[0].time, 3.0);
        assert_eq!(rows[0].deepfake_probability, 55.0);
    }

    #[test]
    fn header_only_yields_no_rows_and_no_average() {
        let report = BatchReport::parse(BATCH_HEADER).unwrap();
        assert!(report.rows.is_empty());
        assert_eq!(report.average, None);
    }

    #[test]
    fn empty_body_is_an_error() {
        assert_eq!(parse_batch_csv("\n\n"), Err(ProtocolError::EmptyBatch));
    }

    #[test]
    fn unknown_header_is_an_error() {
        let err = parse_batch_csv("t,p\n0.0,10").unwrap_err();
        assert!(matches!(err, ProtocolError::BatchHeader { .. }));
    }

    #[test]
    fn malformed_row_rejects_whole_body() {
        let body = "time,deepfake_probability\n0.0,10\n1.0,abc\n2.0,90";
        let err = parse_batch_csv(body).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MalformedBatchLine {
                line: 3,
                reason: "deepfake_probability \"abc\" is not a number".to_string()
            }
        );
    }

    #[test]
    fn extra_fields_are_rejected() {
        let body = "time,deepfake_probability\n0.0,10,extra";
        let err = parse_batch_csv(body).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedBatchLine { line: 2, .. }));
    }

    #[test]
    fn out_of_range_probability_is_rejected() {
        let body = "time,deepfake_probability\n0.0,120";
        assert!(parse_batch_csv(body).is_err());
    }

    #[test]
    fn padded_fields_and_blank_lines_are_tolerated() {
        let body = "time , deepfake_probability\n\n 0.25 ,  30 \n\n1.25,70\n";
        let report = BatchReport::parse(body).unwrap();
        assert_eq!(
            report.rows,
            vec![
                BatchRow { time: 0.25, deepfake_probability: 30.0 },
                BatchRow { time: 1.25, deepfake_probability: 70.0 },
            ]
        );
        assert_eq!(report.average, Some(50.0));
    }

    #[test]
    fn short_row_rejects_whole_body() {
        let body = "time,deepfake_probability\n0.0,10\n1.0";
        assert!(matches!(
            parse_batch_csv(body),
            Err(ProtocolError::MalformedBatchLine { line: 3, .. })
        ));
    }

    #[test]
    fn average_of_empty_series_is_none() {
        assert_eq!(average_probability(&[]), None);
    }
}
