use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::game_definition::{GameDefinition, Payline, SymbolId};
use crate::money::{mul_money, round_money, Money};
use crate::reel_spinner::ReelOutcome;

/// A payline that paid out on a spin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinningLine {
    /// 1-based position of the payline in the game definition
    pub line_number: usize,
    pub symbol: SymbolId,
    #[serde(rename = "count")]
    pub match_count: usize,
    pub mask: Payline,
    pub amount: Money,
}

/// Symbols a payline picks out of an outcome, one per reel in reel order.
/// `None` if the outcome does not cover a selected cell.
pub fn line_symbols(payline: &Payline, outcome: &ReelOutcome) -> Option<Vec<SymbolId>> {
    (0..payline.reels())
        .map(|reel| {
            let row = payline.selected_row(reel)?;
            outcome.get(reel)?.get(row).copied()
        })
        .collect()
}

/// Length of the run of equal symbols starting at the leftmost reel.
/// The first mismatch ends the run even if later reels match again.
pub fn leading_run(symbols: &[SymbolId]) -> usize {
    match symbols.first() {
        Some(first) => symbols.iter().take_while(|&s| s == first).count(),
        None => 0,
    }
}

/// Walks every payline of `def` over `outcome` and returns the lines that pay.
pub fn evaluate(def: &GameDefinition, outcome: &ReelOutcome, bet_amount: Money) -> Vec<WinningLine> {
    def.paylines()
        .iter()
        .enumerate()
        .filter_map(|(index, payline)| {
            let symbols = line_symbols(payline, outcome)?;
            let run = leading_run(&symbols);
            if run < 3 {
                return None;
            }
            let symbol = symbols[0];
            let multiplier = def.multiplier(symbol, run)?;
            Some(WinningLine {
                line_number: index + 1,
                symbol,
                match_count: run,
                mask: payline.clone(),
                amount: mul_money(bet_amount, multiplier),
            })
        })
        .collect()
}

pub fn total_payout(lines: &[WinningLine]) -> Money {
    round_money(lines.iter().map(|line| line.amount).sum::<Decimal>())
}
