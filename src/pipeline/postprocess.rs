//! Post-processing: deterministic cleanup of parsed records.
//!
//! Even a well-prompted model occasionally emits values that are right in
//! substance but wrong in form: padded strings, the word `"null"` instead of
//! a JSON null, a lower-case tracking code, or a tracking code and process
//! number swapped because the two columns are interleaved on the page.
//!
//! These rules fix form only. A record is never dropped, merged or
//! reordered, and a value that matches neither pattern is left where the
//! model put it.
//!
//! Rules (applied in order):
//! 1. Trim whitespace; empty strings and `"null"`/`"none"` become null
//! 2. Upper-case and de-space tracking codes
//! 3. Swap `rastreio`/`processo` when each matches the other's pattern

use crate::output::Record;
use crate::prompts::{PROCESS_NUMBER_PATTERN, TRACKING_CODE_PATTERN};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_TRACKING: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^{TRACKING_CODE_PATTERN}$")).unwrap());

static RE_PROCESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^{PROCESS_NUMBER_PATTERN}$")).unwrap());

/// Whether `value` is a well-formed tracking code.
pub fn is_tracking_code(value: &str) -> bool {
    RE_TRACKING.is_match(value)
}

/// Whether `value` is a well-formed process number.
pub fn is_process_number(value: &str) -> bool {
    RE_PROCESS.is_match(value)
}

/// Apply all rules to every record, keeping order and count.
pub fn clean_records(records: Vec<Record>) -> Vec<Record> {
    records.into_iter().map(clean_record).collect()
}

/// Apply all rules to one record.
pub fn clean_record(record: Record) -> Record {
    let mut r = Record {
        rastreio: normalise_value(record.rastreio),
        processo: normalise_value(record.processo),
        data_envio: normalise_value(record.data_envio),
        destino: normalise_value(record.destino),
        hora_envio: normalise_value(record.hora_envio),
        documento_tipo: normalise_value(record.documento_tipo),
    };
    r.rastreio = r.rastreio.map(normalise_tracking_code);
    swap_misplaced_codes(&mut r);
    r
}

/// Whether the record's codes are absent or well-formed.
pub fn has_well_formed_codes(record: &Record) -> bool {
    record.rastreio.as_deref().map_or(true, is_tracking_code)
        && record.processo.as_deref().map_or(true, is_process_number)
}

// ── Rule 1: Trim and null-out placeholders ───────────────────────────────────

fn normalise_value(value: Option<String>) -> Option<String> {
    let v = value?;
    let t = v.trim();
    if t.is_empty() || t.eq_ignore_ascii_case("null") || t.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(t.to_string())
    }
}

// ── Rule 2: Tracking code form ───────────────────────────────────────────────

fn normalise_tracking_code(code: String) -> String {
    let compact: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    let upper = compact.to_uppercase();
    if is_tracking_code(&upper) {
        upper
    } else {
        code
    }
}

// ── Rule 3: Swap misplaced codes ─────────────────────────────────────────────

fn swap_misplaced_codes(r: &mut Record) {
    let rastreio_is_process = r.rastreio.as_deref().is_some_and(is_process_number);
    let processo_is_tracking = r
        .processo
        .as_deref()
        .map(|p| p.to_uppercase())
        .is_some_and(|p| is_tracking_code(&p));

    // Swap only when the move makes both fields valid.
    let swap = match (rastreio_is_process, processo_is_tracking) {
        (true, true) => true,
        (true, false) => r.processo.is_none(),
        (false, true) => r.rastreio.is_none(),
        (false, false) => false,
    };

    if swap {
        std::mem::swap(&mut r.rastreio, &mut r.processo);
        r.rastreio = r.rastreio.take().map(normalise_tracking_code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(rastreio: Option<&str>, processo: Option<&str>) -> Record {
        Record {
            rastreio: rastreio.map(String::from),
            processo: processo.map(String::from),
            data_envio: Some("01/02/2024".into()),
            destino: Some("PROGRAD".into()),
            ..Default::default()
        }
    }

    #[test]
    fn patterns() {
        assert!(is_tracking_code("AB123456789BR"));
        assert!(!is_tracking_code("AB12345678BR"));
        assert!(!is_tracking_code("ab123456789br"));
        assert!(is_process_number("123456/2024-01"));
        assert!(is_process_number("23068012345/2023-77"));
        assert!(!is_process_number("12345/2024-01"));
    }

    #[test]
    fn trims_and_nulls_placeholders() {
        let r = clean_record(Record {
            rastreio: Some("  ".into()),
            processo: Some("null".into()),
            data_envio: Some(" 01/02/2024 ".into()),
            destino: Some("None".into()),
            ..Default::default()
        });
        assert_eq!(r.rastreio, None);
        assert_eq!(r.processo, None);
        assert_eq!(r.data_envio.as_deref(), Some("01/02/2024"));
        assert_eq!(r.destino, None);
    }

    #[test]
    fn tracking_code_is_upper_cased() {
        let r = clean_record(rec(Some("ab 123456789 br"), None));
        assert_eq!(r.rastreio.as_deref(), Some("AB123456789BR"));
    }

    #[test]
    fn swapped_codes_are_put_back() {
        let r = clean_record(rec(Some("123456/2024-01"), Some("AB123456789BR")));
        assert_eq!(r.rastreio.as_deref(), Some("AB123456789BR"));
        assert_eq!(r.processo.as_deref(), Some("123456/2024-01"));
    }

    #[test]
    fn lone_process_number_in_tracking_column_moves() {
        let r = clean_record(rec(Some("123456/2024-01"), None));
        assert_eq!(r.rastreio, None);
        assert_eq!(r.processo.as_deref(), Some("123456/2024-01"));
    }

    #[test]
    fn unrecognised_values_stay_put() {
        let r = clean_record(rec(Some("???"), Some("123456/2024-01")));
        assert_eq!(r.rastreio.as_deref(), Some("???"));
        assert_eq!(r.processo.as_deref(), Some("123456/2024-01"));
        assert!(!has_well_formed_codes(&r));
    }

    #[test]
    fn clean_records_keeps_count_and_order() {
        let input = vec![
            rec(Some("AA000000001BR"), None),
            rec(None, None),
            rec(Some("AA000000003BR"), None),
        ];
        let out = clean_records(input.clone());
        assert_eq!(out, input);
    }
}
