// =============================================================================
// Message rendering — plain-text bodies for open / ladder / close notices
// =============================================================================

use crate::indicators::rsi::rsi_zone;
use crate::lifecycle::{CloseSummary, LadderNotice, OpenNotice};

/// Format a price with precision that suits its magnitude.
pub fn format_price(price: f64) -> String {
    let abs = price.abs();
    if abs >= 1000.0 {
        format!("{price:.2}")
    } else if abs >= 1.0 {
        format!("{price:.4}")
    } else {
        format!("{price:.8}")
    }
}

fn format_pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:+.2}%"),
        None => "n/a".to_string(),
    }
}

fn entry_lines(entries: &[f64]) -> String {
    entries
        .iter()
        .rev()
        .enumerate()
        .map(|(i, p)| format!("  #{} {}", i + 1, format_price(*p)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_open(n: &OpenNotice) -> String {
    let ind = &n.indicators;
    format!(
        "🟢 BUY SIGNAL {symbol}\n\
         Entry: {entry}\n\
         Target: {target}\n\
         RSI 4h {rl:.2} ({rlz}) | 15m {rm:.2} | 1m {rs:.2} ({rsz})\n\
         MACD 4h {macd:.6} | 6h crossover: {cross}\n\
         Reference: {reference}\n\
         Opened: {opened}",
        symbol = n.symbol,
        entry = format_price(n.entry_price),
        target = format_price(n.target_price),
        rl = ind.rsi_long,
        rlz = rsi_zone(ind.rsi_long),
        rm = ind.rsi_mid,
        rs = ind.rsi_short,
        rsz = rsi_zone(ind.rsi_short),
        macd = ind.macd_long,
        cross = if ind.macd_crossover_long { "yes" } else { "no" },
        reference = n
            .reference_price
            .map(format_price)
            .unwrap_or_else(|| "n/a".to_string()),
        opened = n.opened_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

pub fn render_ladder(n: &LadderNotice) -> String {
    format!(
        "🟢 BUY SIGNAL {symbol} — {count} entries\n\
         Entries:\n{entries}\n\
         Target: {target}",
        symbol = n.symbol,
        count = n.entries.len(),
        entries = entry_lines(&n.entries),
        target = format_price(n.target_price),
    )
}

pub fn render_close(s: &CloseSummary) -> String {
    format!(
        "✅ TARGET ACHIEVED {symbol}\n\
         Entries:\n{entries}\n\
         Target: {target} | Exit: {exit}\n\
         Held: {held}\n\
         Max drawdown: {drawdown:.2}% (bottom {bottom})\n\
         Reference since open: {reference}",
        symbol = s.symbol,
        entries = entry_lines(&s.entries),
        target = format_price(s.target_price),
        exit = format_price(s.exit_price),
        held = s.held(),
        drawdown = s.drawdown_pct,
        bottom = format_price(s.bottom_price),
        reference = format_pct(s.reference_change_pct),
    )
}
