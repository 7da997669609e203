use anyhow::{anyhow, Context, Result};

/// Ключ из аргумента: "hex:...": байты из hex, иначе UTF-8 как есть.
pub fn decode_key_arg(arg: &str) -> Result<Vec<u8>> {
    match arg.strip_prefix("hex:") {
        Some(hx) => decode_hex(hx),
        None => Ok(arg.as_bytes().to_vec()),
    }
}

/// Пары hex-цифр в байты; пробелы по краям игнорируются.
pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let digits = s.trim().as_bytes();
    if digits.len() % 2 == 1 {
        return Err(anyhow!("odd number of hex digits ({})", digits.len()));
    }
    digits
        .chunks(2)
        .enumerate()
        .map(|(i, pair)| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|p| u8::from_str_radix(p, 16).ok())
                .with_context(|| format!("bad hex byte #{} in key", i))
        })
        .collect()
}
