// loads an OHLC(V) bar series from CSV. the first column is the timestamp;
// `Open, High, Low, Close` are required; `Volume` and any other numeric
// column are carried through opaquely.

use std::error::Error;
use std::sync::Arc;

use chrono::NaiveDateTime;
use csv::ReaderBuilder;
use log::warn;

use crate::ohlc::OhlcSeries;

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d"];

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, Box<dyn Error>> {
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
        if *fmt == "%Y-%m-%d" {
            if let Ok(d) = chrono::NaiveDate::parse_from_str(s, fmt) {
                return Ok(d.and_hms_opt(0, 0, 0).unwrap());
            }
        }
    }
    Err(format!("unrecognized timestamp format: {s}").into())
}

pub fn load_csv(path: &str) -> Result<Arc<OhlcSeries>, Box<dyn Error>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = rdr.headers()?.clone();

    let find = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let col_open = find("open").ok_or("missing Open column")?;
    let col_high = find("high").ok_or("missing High column")?;
    let col_low = find("low").ok_or("missing Low column")?;
    let col_close = find("close").ok_or("missing Close column")?;
    let col_volume = find("volume");

    let mut index = Vec::new();
    let mut open = Vec::new();
    let mut high = Vec::new();
    let mut low = Vec::new();
    let mut close = Vec::new();
    let mut volume = col_volume.map(|_| Vec::new());

    let known: std::collections::HashSet<usize> =
        [Some(0), Some(col_open), Some(col_high), Some(col_low), Some(col_close), col_volume]
            .into_iter()
            .flatten()
            .collect();
    let extra_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !known.contains(i))
        .map(|(i, h)| (i, h.to_string()))
        .collect();
    let mut extra: std::collections::HashMap<String, Vec<f64>> =
        extra_cols.iter().map(|(_, name)| (name.clone(), Vec::new())).collect();

    for result in rdr.records() {
        let record = result?;
        index.push(parse_timestamp(&record[0])?);
        open.push(record[col_open].parse::<f64>()?);
        high.push(record[col_high].parse::<f64>()?);
        low.push(record[col_low].parse::<f64>()?);
        close.push(record[col_close].parse::<f64>()?);
        if let Some(vc) = col_volume {
            let v = record[vc].trim();
            volume.as_mut().unwrap().push(if v.is_empty() { f64::NAN } else { v.parse::<f64>()? });
        }
        for (i, name) in &extra_cols {
            let v = record[*i].trim();
            let parsed = if v.is_empty() { f64::NAN } else { v.parse::<f64>()? };
            extra.get_mut(name).unwrap().push(parsed);
        }
    }

    let mut series = OhlcSeries::new(index, open, high, low, close, volume)?;
    series.extra = extra;

    if !series.is_monotonic_increasing() {
        warn!("{path}: index is not monotonic increasing; sorting");
        series.sort_by_index();
    }

    Ok(Arc::new(series))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_required_columns_and_passes_extra_through() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Date,Open,High,Low,Close,Volume,Spread").unwrap();
        writeln!(file, "2020-01-01 00:00:00,1.0,1.2,0.9,1.1,1000,0.01").unwrap();
        writeln!(file, "2020-01-02 00:00:00,1.1,1.3,1.0,1.2,1200,0.02").unwrap();
        let series = load_csv(file.path().to_str().unwrap()).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.close, vec![1.1, 1.2]);
        assert_eq!(series.extra.get("Spread").unwrap(), &vec![0.01, 0.02]);
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Date,Open,High,Low").unwrap();
        writeln!(file, "2020-01-01,1.0,1.2,0.9").unwrap();
        assert!(load_csv(file.path().to_str().unwrap()).is_err());
    }
}
