use super::error::SampleParseError;

/// One serial read event: the time it was logged and the integers it carried.
///
/// The mill reports a full rotor turn ("round") per line, so `values` is one waveform.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sample {
    pub timestamp: f64,
    pub values: Vec<i64>,
}

impl Sample {
    pub fn new(timestamp: f64, values: Vec<i64>) -> Self {
        Self { timestamp, values }
    }

    /// Format the log line for this sample. The raw text is kept as received so the log
    /// stays a faithful copy of the serial stream.
    pub fn to_csv_line(&self, raw: &str) -> String {
        format!("{:.6},{}", self.timestamp, raw)
    }

    /// Values with a constant offset removed (e.g. 255 for the 8-bit firmware).
    /// Results that do not fit an i64 are clamped.
    pub fn centered(&self, offset: i64) -> Vec<i64> {
        self.values.iter().map(|v| v.saturating_sub(offset)).collect()
    }
}

/// Parse a line of the form `v1,v2,...,vN` into integers.
///
/// Surrounding whitespace (including the line terminator) is ignored, as is whitespace
/// around each token. Any token that is not an integer rejects the whole line.
pub fn parse_line(line: &str) -> Result<Vec<i64>, SampleParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(SampleParseError::EmptyLine);
    }
    line.split(',')
        .enumerate()
        .map(|(position, token)| {
            token
                .trim()
                .parse::<i64>()
                .map_err(|_| SampleParseError::BadToken {
                    token: token.to_string(),
                    position,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_line() {
        let values = parse_line("255,260,301,12\r\n").unwrap();
        assert_eq!(values, vec![255, 260, 301, 12]);
    }

    #[test]
    fn test_negative_and_spaced_tokens() {
        assert_eq!(parse_line(" -3, 4 ,5").unwrap(), vec![-3, 4, 5]);
    }

    #[test]
    fn test_bad_token_is_rejected() {
        let err = parse_line("255,2x6,300").unwrap_err();
        assert_eq!(
            err,
            SampleParseError::BadToken {
                token: String::from("2x6"),
                position: 1
            }
        );
    }

    #[test]
    fn test_empty_token_and_line() {
        assert!(matches!(
            parse_line("1,,2"),
            Err(SampleParseError::BadToken { position: 1, .. })
        ));
        assert_eq!(parse_line("  \n"), Err(SampleParseError::EmptyLine));
    }

    #[test]
    fn test_csv_line_keeps_raw_text() {
        let sample = Sample::new(1720632755.25, vec![1, 2]);
        assert_eq!(sample.to_csv_line("1,2"), "1720632755.250000,1,2");
        assert_eq!(sample.centered(255), vec![-254, -253]);
    }

    #[test]
    fn test_centering_extreme_values_clamps() {
        let values = parse_line("-9223372036854775808,1").unwrap();
        let sample = Sample::new(0.0, values);
        assert_eq!(sample.centered(255), vec![i64::MIN, -254]);
        assert_eq!(
            Sample::new(0.0, vec![i64::MAX]).centered(-1),
            vec![i64::MAX]
        );
    }
}
