//! Reward notice templates.
//!
//! Templates carry three placeholders: `{amount}`, `{currency}` (the
//! display symbol) and `{player}`. Unknown placeholders are left verbatim,
//! and substituted values are never scanned again, so a symbol or name
//! that itself looks like a placeholder is printed as-is.

/// Renders `template` for one grant.
///
/// ```rust
/// use playclock_reward::render_template;
///
/// let text = render_template("+{amount} {currency} for {player}", 5.0, "gold", "alex");
/// assert_eq!(text, "+5 gold for alex");
/// ```
pub fn render_template(template: &str, amount: f64, currency: &str, player: &str) -> String {
    let amount = format_amount(amount);
    let values = [
        ("{amount}", amount.as_str()),
        ("{currency}", currency),
        ("{player}", player),
    ];

    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        match values.iter().find(|(key, _)| tail.starts_with(key)) {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Formats an amount for players: whole numbers without decimals, other
/// values with at most two, trailing zeros trimmed.
pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        return format!("{amount:.0}");
    }
    let text = format!("{amount:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
