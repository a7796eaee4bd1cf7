/// Format bytes as a hex string
pub fn format_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Format bytes as a hex string with spaces
pub fn format_hex_spaced(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format bytes as a hex string with a separator between each byte
pub fn format_hex_separated(bytes: &[u8], separator: &str) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Get a human-readable description of SW1/SW2 status words.
///
/// Covers ISO 7816-4 interindustry codes plus the `91 xx` family returned
/// by cards answering proprietary class-90 commands.
pub fn describe_status_word(sw1: u8, sw2: u8) -> String {
    match (sw1, sw2) {
        (0x90, 0x00) => "Success".to_string(),
        (0x61, n) => format!("Success, {n} bytes available"),
        (0x62, 0x81) => "Warning: Part of returned data may be corrupted".to_string(),
        (0x62, 0x82) => "Warning: End of file reached".to_string(),
        (0x62, _) => "Warning: No information given".to_string(),
        (0x63, n) if n & 0xF0 == 0xC0 => format!("Warning: Counter = {}", n & 0x0F),
        (0x63, _) => "Warning: No information given".to_string(),
        (0x64, 0x00) => "Error: Execution error".to_string(),
        (0x65, 0x81) => "Error: Memory failure".to_string(),
        (0x67, 0x00) => "Error: Wrong length".to_string(),
        (0x68, 0x81) => "Error: Logical channel not supported".to_string(),
        (0x68, _) => "Error: Functions in CLA not supported".to_string(),
        (0x69, 0x82) => "Error: Security status not satisfied".to_string(),
        (0x69, 0x85) => "Error: Conditions of use not satisfied".to_string(),
        (0x69, 0x86) => "Error: Command not allowed (no current EF)".to_string(),
        (0x69, _) => "Error: Command not allowed".to_string(),
        (0x6A, 0x81) => "Error: Function not supported".to_string(),
        (0x6A, 0x82) => "Error: File not found".to_string(),
        (0x6A, 0x86) => "Error: Incorrect parameters P1-P2".to_string(),
        (0x6A, 0x88) => "Error: Referenced data not found".to_string(),
        (0x6A, _) => "Error: Wrong parameter(s)".to_string(),
        (0x6C, n) => format!("Error: Wrong Le field, exact length: {n}"),
        (0x6D, 0x00) => "Error: Instruction code not supported or invalid".to_string(),
        (0x6E, 0x00) => "Error: Class not supported".to_string(),
        (0x6F, 0x00) => "Error: No precise diagnosis".to_string(),
        (0x91, 0x00) => "Success (proprietary)".to_string(),
        (0x91, 0x1C) => "Error: Illegal command code".to_string(),
        (0x91, 0x7E) => "Error: Length error".to_string(),
        (0x91, 0x9D) => "Error: Permission denied".to_string(),
        (0x91, 0xA0) => "Error: Application not found".to_string(),
        (0x91, 0xAE) => "Error: Authentication error".to_string(),
        (0x91, 0xF0) => "Error: File not found".to_string(),
        _ => format!("Unknown status: {sw1:02X} {sw2:02X}"),
    }
}
