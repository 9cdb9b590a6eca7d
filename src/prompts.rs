//! Extraction instructions sent alongside every page.
//!
//! Callers can override the instruction via
//! [`crate::config::ExtractionConfig::instruction`]; the constants here are
//! used only when no override is provided.
//!
//! The instruction is the whole schema contract with the service: the field
//! set, the two patterns that tell tracking codes from process numbers, what
//! to leave out, and that the answer is a bare JSON array.

/// Pattern of a postal tracking code (`rastreio`).
pub const TRACKING_CODE_PATTERN: &str = r"[A-Z]{2}\d{9}BR";

/// Pattern of a process number (`processo`).
pub const PROCESS_NUMBER_PATTERN: &str = r"\d{6,}/\d{4}-\d{2}";

/// Default instruction: the four base fields.
pub const DEFAULT_INSTRUCTION: &str = r#"You are an expert data parser for government protocol reports (SIPAC).
The attached document is ONE page of a report. Its layout is tabular but visually inconsistent.

GOAL: extract EVERY record of the table on this page. Do not skip any row.

OUTPUT (a JSON array, nothing else):
[
  {
    "rastreio": "postal tracking code (XX123456789BR) or null",
    "processo": "process number (000000/0000-00) or null",
    "data_envio": "date DD/MM/YYYY",
    "destino": "destination sector name"
  }
]

RULES
1. FIELD SEPARATION
   - Tracking codes match the pattern [A-Z]{2}\d{9}BR.
   - Process numbers match the pattern \d{6,}/\d{4}-\d{2}.
   - These two values are visually adjacent or interleaved in the table.
     Assign each value by its PATTERN, never by its column position.
2. WHAT TO IGNORE
   - Page headers and footers, page numbers, print dates
   - Report titles and column headings repeated on every page
3. OUTPUT FORMAT
   - Output ONLY the raw JSON array
   - No Markdown fences, no commentary, no explanations
   - If the page has no records, output []"#;

/// Default instruction when the report also carries time and document type.
pub const EXTENDED_INSTRUCTION: &str = r#"You are an expert data parser for government protocol reports (SIPAC).
The attached document is ONE page of a report. Its layout is tabular but visually inconsistent.

GOAL: extract EVERY record of the table on this page. Do not skip any row.

OUTPUT (a JSON array, nothing else):
[
  {
    "rastreio": "postal tracking code (XX123456789BR) or null",
    "processo": "process number (000000/0000-00) or null",
    "data_envio": "date DD/MM/YYYY",
    "hora_envio": "time HH:MM:SS or null",
    "destino": "destination sector name",
    "documento_tipo": "document type or null"
  }
]

RULES
1. FIELD SEPARATION
   - Tracking codes match the pattern [A-Z]{2}\d{9}BR.
   - Process numbers match the pattern \d{6,}/\d{4}-\d{2}.
   - These two values are visually adjacent or interleaved in the table.
     Assign each value by its PATTERN, never by its column position.
   - Date and time may share one cell; split them into data_envio and hora_envio.
2. WHAT TO IGNORE
   - Page headers and footers, page numbers, print dates
   - Report titles and column headings repeated on every page
3. OUTPUT FORMAT
   - Output ONLY the raw JSON array
   - No Markdown fences, no commentary, no explanations
   - If the page has no records, output []"#;

/// Pick the built-in instruction for the requested field set.
pub fn default_instruction(extended_fields: bool) -> &'static str {
    if extended_fields {
        EXTENDED_INSTRUCTION
    } else {
        DEFAULT_INSTRUCTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RecordField;

    #[test]
    fn instructions_name_both_patterns() {
        for instruction in [DEFAULT_INSTRUCTION, EXTENDED_INSTRUCTION] {
            assert!(instruction.contains(TRACKING_CODE_PATTERN));
            assert!(instruction.contains(PROCESS_NUMBER_PATTERN));
            assert!(instruction.contains("ONLY the raw JSON array"));
        }
    }

    #[test]
    fn instructions_list_their_fields() {
        for field in RecordField::BASE {
            assert!(DEFAULT_INSTRUCTION.contains(&format!("\"{}\"", field.name())));
        }
        for field in RecordField::EXTENDED {
            assert!(EXTENDED_INSTRUCTION.contains(&format!("\"{}\"", field.name())));
        }
        assert!(!DEFAULT_INSTRUCTION.contains("hora_envio"));
    }
}
