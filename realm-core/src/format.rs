//! Display formatting for amounts shown next to items and balances.

/// Groups thousands with spaces: `1234567` -> `1 234 567`.
pub fn format_money(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    out
}

/// Weight with at most two decimals and no trailing zeros.
pub fn format_weight(weight: f64) -> String {
    let s = format!("{:.2}", weight);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Total stack weight, e.g. for the inventory capacity bar.
pub fn stack_weight(unit_weight: f64, count: i64) -> f64 {
    unit_weight * count.max(0) as f64
}
