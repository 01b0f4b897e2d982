//! Parsing and formatting for Kubernetes-style resource quantities.
//!
//! CPU is expressed in millicores, memory in bytes, GPU as a plain count.
//! All three round-trip: `parse(format(v)) == v` for any canonical value
//! this module itself produced.

use crate::error::ControlPlaneError;

const KI: i128 = 1 << 10;
const MI: i128 = 1 << 20;
const GI: i128 = 1 << 30;
const TI: i128 = 1 << 40;

/// Parses a decimal string (optionally with a fractional part) scaled by
/// `scale`, rounding half-to-even, entirely in integer arithmetic so the
/// result never depends on `f64` rounding behavior.
fn parse_decimal_scaled(s: &str, scale: i128) -> std::result::Result<i128, ControlPlaneError> {
    if s.is_empty() {
        return Ok(0);
    }
    if s.starts_with('-') {
        return Err(ControlPlaneError::InvalidInput(format!(
            "negative quantity not allowed: {s}"
        )));
    }

    let (int_str, frac_str) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };

    let int_str = if int_str.is_empty() { "0" } else { int_str };
    if !int_str.bytes().all(|b| b.is_ascii_digit()) || !frac_str.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(ControlPlaneError::InvalidInput(format!(
            "not a number: {s}"
        )));
    }

    let int_part: i128 = int_str
        .parse()
        .map_err(|_| ControlPlaneError::InvalidInput(format!("not a number: {s}")))?;
    let frac_digits = frac_str.len() as u32;
    let frac_part: i128 = if frac_str.is_empty() {
        0
    } else {
        frac_str
            .parse()
            .map_err(|_| ControlPlaneError::InvalidInput(format!("not a number: {s}")))?
    };

    let denom = 10i128.pow(frac_digits);
    let numerator = int_part * denom + frac_part;

    let scaled_numerator = numerator * scale;
    let q = scaled_numerator / denom;
    let r = scaled_numerator % denom;
    let twice_r = r * 2;

    let rounded = if twice_r > denom {
        q + 1
    } else if twice_r == denom && q % 2 != 0 {
        q + 1
    } else {
        q
    };

    Ok(rounded)
}

/// Parses a CPU quantity (`"500m"`, `"2"`, `"1.5"`) into millicores.
pub fn parse_cpu(raw: &str) -> std::result::Result<i64, ControlPlaneError> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(0);
    }

    if let Some(millis) = s.strip_suffix('m') {
        if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ControlPlaneError::InvalidInput(format!(
                "invalid cpu quantity: {raw}"
            )));
        }
        return millis
            .parse::<i64>()
            .map_err(|_| ControlPlaneError::InvalidInput(format!("invalid cpu quantity: {raw}")));
    }

    let millicores = parse_decimal_scaled(s, 1000)
        .map_err(|_| ControlPlaneError::InvalidInput(format!("invalid cpu quantity: {raw}")))?;
    i128_to_i64(millicores, raw)
}

/// Formats millicores back into the minimal Kubernetes-style CPU string.
pub fn format_cpu(millicores: i64) -> String {
    if millicores % 1000 == 0 {
        format!("{}", millicores / 1000)
    } else {
        format!("{millicores}m")
    }
}

/// Parses a memory quantity (`"256Mi"`, `"1Gi"`, `"512"`) into bytes.
pub fn parse_memory(raw: &str) -> std::result::Result<i64, ControlPlaneError> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(0);
    }

    let (number, scale) = if let Some(n) = s.strip_suffix("Ki") {
        (n, KI)
    } else if let Some(n) = s.strip_suffix("Mi") {
        (n, MI)
    } else if let Some(n) = s.strip_suffix("Gi") {
        (n, GI)
    } else if let Some(n) = s.strip_suffix("Ti") {
        (n, TI)
    } else if let Some(n) = s.strip_suffix('K') {
        (n, 1_000)
    } else if let Some(n) = s.strip_suffix('M') {
        (n, 1_000_000)
    } else if let Some(n) = s.strip_suffix('G') {
        (n, 1_000_000_000)
    } else if let Some(n) = s.strip_suffix('T') {
        (n, 1_000_000_000_000)
    } else {
        (s, 1)
    };

    let bytes = parse_decimal_scaled(number, scale)
        .map_err(|_| ControlPlaneError::InvalidInput(format!("invalid memory quantity: {raw}")))?;
    i128_to_i64(bytes, raw)
}

/// Formats bytes back into the minimal Kubernetes-style memory string,
/// preferring the largest binary suffix that divides evenly.
pub fn format_memory(bytes: i64) -> String {
    let b = bytes as i128;
    for (suffix, unit) in [("Ti", TI), ("Gi", GI), ("Mi", MI), ("Ki", KI)] {
        if unit != 0 && b % unit == 0 && b != 0 {
            return format!("{}{}", b / unit, suffix);
        }
    }
    format!("{bytes}")
}

/// Parses a GPU count, stripping an optional case-insensitive `GPU` suffix.
pub fn parse_gpu(raw: &str) -> std::result::Result<i64, ControlPlaneError> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(0);
    }

    let stripped = if s.len() > 3 && s[s.len() - 3..].eq_ignore_ascii_case("gpu") {
        &s[..s.len() - 3]
    } else {
        s
    };

    if stripped.is_empty() || !stripped.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ControlPlaneError::InvalidInput(format!(
            "invalid gpu quantity: {raw}"
        )));
    }

    stripped
        .parse::<i64>()
        .map_err(|_| ControlPlaneError::InvalidInput(format!("invalid gpu quantity: {raw}")))
}

/// Formats a GPU count back into its plain decimal form.
pub fn format_gpu(count: i64) -> String {
    format!("{count}")
}

fn i128_to_i64(value: i128, raw: &str) -> std::result::Result<i64, ControlPlaneError> {
    if value < 0 {
        return Err(ControlPlaneError::InvalidInput(format!(
            "negative quantity not allowed: {raw}"
        )));
    }
    i64::try_from(value).map_err(|_| ControlPlaneError::InvalidInput(format!("quantity overflow: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_millicore_suffix() {
        assert_eq!(parse_cpu("500m").unwrap(), 500);
        assert_eq!(parse_cpu("0m").unwrap(), 0);
    }

    #[test]
    fn cpu_whole_cores() {
        assert_eq!(parse_cpu("2").unwrap(), 2000);
        assert_eq!(parse_cpu("1.5").unwrap(), 1500);
    }

    #[test]
    fn cpu_empty_is_zero() {
        assert_eq!(parse_cpu("").unwrap(), 0);
        assert_eq!(parse_cpu("0").unwrap(), 0);
    }

    #[test]
    fn cpu_round_half_to_even() {
        // 0.0005 * 1000 = 0.5, ties to even -> 0
        assert_eq!(parse_cpu("0.0005").unwrap(), 0);
        // 0.0015 * 1000 = 1.5, ties to even -> 2
        assert_eq!(parse_cpu("0.0015").unwrap(), 2);
    }

    #[test]
    fn cpu_rejects_garbage() {
        assert!(parse_cpu("abc").is_err());
        assert!(parse_cpu("5mm").is_err());
    }

    #[test]
    fn memory_binary_suffixes() {
        assert_eq!(parse_memory("256Mi").unwrap(), 256 * (1 << 20));
        assert_eq!(parse_memory("1Gi").unwrap(), 1 << 30);
        assert_eq!(parse_memory("1Ki").unwrap(), 1024);
    }

    #[test]
    fn memory_decimal_si_suffixes() {
        assert_eq!(parse_memory("1K").unwrap(), 1_000);
        assert_eq!(parse_memory("2G").unwrap(), 2_000_000_000);
    }

    #[test]
    fn memory_no_suffix_is_bytes() {
        assert_eq!(parse_memory("512").unwrap(), 512);
    }

    #[test]
    fn memory_format_prefers_minimal_suffix() {
        assert_eq!(format_memory(2048 * (1 << 20)), "2Gi");
        assert_eq!(format_memory(384 * (1 << 20)), "384Mi");
        assert_eq!(format_memory(123), "123");
    }

    #[test]
    fn gpu_strips_case_insensitive_suffix() {
        assert_eq!(parse_gpu("2GPU").unwrap(), 2);
        assert_eq!(parse_gpu("2gpu").unwrap(), 2);
        assert_eq!(parse_gpu("3").unwrap(), 3);
    }

    #[test]
    fn roundtrip_cpu() {
        for millis in [0, 1, 500, 1000, 1500, 4000, 123456] {
            assert_eq!(parse_cpu(&format_cpu(millis)).unwrap(), millis);
        }
    }

    #[test]
    fn roundtrip_memory() {
        for bytes in [0, 1, 1024, 1 << 20, 1 << 30, 3 * (1 << 30), 123] {
            assert_eq!(parse_memory(&format_memory(bytes)).unwrap(), bytes);
        }
    }

    #[test]
    fn roundtrip_gpu() {
        for count in [0, 1, 2, 8] {
            assert_eq!(parse_gpu(&format_gpu(count)).unwrap(), count);
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_roundtrip_cpu(millis in 0i64..10_000_000) {
            proptest::prop_assert_eq!(parse_cpu(&format_cpu(millis)).unwrap(), millis);
        }

        #[test]
        fn prop_roundtrip_memory(bytes in 0i64..(1i64 << 50)) {
            proptest::prop_assert_eq!(parse_memory(&format_memory(bytes)).unwrap(), bytes);
        }
    }
}
