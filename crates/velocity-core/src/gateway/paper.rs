//! Paper trading gateway.
//!
//! Simulates a trading terminal in memory: symbols with ticks and candle
//! series, market-order fills at bid/ask, mark-to-market position profit and
//! a cash balance that absorbs realized P&L on close.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::TradingGateway;
use crate::error::GatewayError;
use crate::types::{
    AccountSnapshot, Candle, CloseAllSummary, CloseFailure, ClosedPosition, OrderFill,
    OrderRequest, OrderSide, Position, SymbolInfo, Tick, Timeframe,
};

/// Return code used for simulated rejections.
pub const RETCODE_REJECT: u32 = 10006;
/// Return code used for invalid volume.
pub const RETCODE_INVALID_VOLUME: u32 = 10014;

#[derive(Debug)]
struct PaperSymbol {
    info: SymbolInfo,
    tick: Option<Tick>,
    candles: HashMap<Timeframe, Vec<Candle>>,
    selected: bool,
}

#[derive(Debug)]
struct PaperState {
    balance: Decimal,
    symbols: HashMap<String, PaperSymbol>,
    positions: BTreeMap<u64, Position>,
    next_ticket: u64,
    max_positions: Option<usize>,
    reject_reason: Option<String>,
    connect_fails: bool,
    orders_sent: usize,
}

/// In-memory trading terminal.
#[derive(Debug)]
pub struct PaperGateway {
    login: u64,
    server: String,
    currency: String,
    connected: AtomicBool,
    state: Mutex<PaperState>,
}

impl PaperGateway {
    pub fn new(balance: Decimal) -> Self {
        Self {
            login: 1,
            server: "Paper-Demo".to_string(),
            currency: "USD".to_string(),
            connected: AtomicBool::new(false),
            state: Mutex::new(PaperState {
                balance,
                symbols: HashMap::new(),
                positions: BTreeMap::new(),
                next_ticket: 1,
                max_positions: None,
                reject_reason: None,
                connect_fails: false,
                orders_sent: 0,
            }),
        }
    }

    /// Register a symbol that is already visible in market watch.
    pub fn add_symbol(&self, info: SymbolInfo) {
        self.insert_symbol(info, true);
    }

    /// Register a symbol that must be selected before it quotes.
    pub fn add_hidden_symbol(&self, info: SymbolInfo) {
        self.insert_symbol(info, false);
    }

    fn insert_symbol(&self, info: SymbolInfo, selected: bool) {
        let mut state = self.state();
        state.symbols.insert(
            info.name.clone(),
            PaperSymbol {
                info,
                tick: None,
                candles: HashMap::new(),
                selected,
            },
        );
    }

    /// Update the quote for a symbol and re-mark its open positions.
    pub fn set_tick(&self, symbol: &str, bid: f64, ask: f64) {
        let mut state = self.state();
        let info = match state.symbols.get_mut(symbol) {
            Some(sym) => {
                sym.tick = Some(Tick {
                    bid,
                    ask,
                    time: Utc::now(),
                });
                sym.info.clone()
            }
            None => return,
        };

        for position in state.positions.values_mut().filter(|p| p.symbol == symbol) {
            let (price, profit) = mark_to_market(position, &info, bid, ask);
            position.current_price = price;
            position.profit = profit;
        }
    }

    /// Replace the candle series for a symbol/timeframe.
    pub fn set_candles(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        let mut state = self.state();
        if let Some(sym) = state.symbols.get_mut(symbol) {
            sym.candles.insert(timeframe, candles);
        }
    }

    /// Append a bar, or replace the last one if it has the same open time.
    pub fn push_candle(&self, symbol: &str, timeframe: Timeframe, candle: Candle) {
        let mut state = self.state();
        if let Some(sym) = state.symbols.get_mut(symbol) {
            let series = sym.candles.entry(timeframe).or_default();
            match series.last_mut() {
                Some(last) if last.time == candle.time => *last = candle,
                _ => series.push(candle),
            }
        }
    }

    /// Override a position's floating profit (kept until the next tick).
    pub fn set_position_profit(&self, ticket: u64, profit: Decimal) {
        if let Some(position) = self.state().positions.get_mut(&ticket) {
            position.profit = profit;
        }
    }

    pub fn set_balance(&self, balance: Decimal) {
        self.state().balance = balance;
    }

    /// Reject every subsequent order with this reason (or stop rejecting).
    pub fn set_reject_orders(&self, reason: Option<String>) {
        self.state().reject_reason = reason;
    }

    pub fn set_max_positions(&self, max: Option<usize>) {
        self.state().max_positions = max;
    }

    pub fn set_connect_failure(&self, fails: bool) {
        self.state().connect_fails = fails;
    }

    /// Number of order sends attempted, accepted or not.
    pub fn orders_sent(&self) -> usize {
        self.state().orders_sent
    }

    pub fn balance(&self) -> Decimal {
        self.state().balance
    }

    fn state(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_connected(&self) -> Result<(), GatewayError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::NotConnected)
        }
    }

    fn close_locked(state: &mut PaperState, ticket: u64) -> Result<ClosedPosition, GatewayError> {
        // Positions are re-marked on every tick, so the stored profit is current.
        let position = state
            .positions
            .remove(&ticket)
            .ok_or(GatewayError::PositionNotFound(ticket))?;
        state.balance += position.profit + position.swap;

        Ok(ClosedPosition {
            ticket,
            close_price: position.current_price,
            profit: position.profit,
        })
    }
}

/// Closing price and floating profit of a position at the given quote.
fn mark_to_market(position: &Position, info: &SymbolInfo, bid: f64, ask: f64) -> (f64, Decimal) {
    let (price, points) = match position.side {
        OrderSide::Buy => (bid, bid - position.open_price),
        OrderSide::Sell => (ask, position.open_price - ask),
    };
    if info.point <= 0.0 {
        return (price, Decimal::ZERO);
    }
    let volume = position.volume.to_f64().unwrap_or(0.0);
    let profit = points / info.point * info.tick_value * volume;
    let profit = Decimal::from_f64(profit).unwrap_or_default().round_dp(2);
    (price, profit)
}

#[async_trait]
impl TradingGateway for PaperGateway {
    async fn connect(&self) -> Result<(), GatewayError> {
        let state = self.state();
        if state.connect_fails {
            warn!(server = %self.server, "Paper terminal refused connection");
            return Err(GatewayError::NotConnected);
        }
        self.connected.store(true, Ordering::SeqCst);
        info!(
            server = %self.server,
            login = self.login,
            balance = %state.balance,
            currency = %self.currency,
            "Paper terminal connected"
        );
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        info!("Paper terminal shut down");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn account_info(&self) -> Option<AccountSnapshot> {
        self.ensure_connected().ok()?;
        let state = self.state();
        let profit: Decimal = state.positions.values().map(|p| p.profit + p.swap).sum();
        let equity = state.balance + profit;
        Some(AccountSnapshot {
            login: self.login,
            server: self.server.clone(),
            balance: state.balance,
            equity,
            margin: Decimal::ZERO,
            free_margin: equity,
            profit,
            currency: self.currency.clone(),
        })
    }

    async fn positions(&self) -> Vec<Position> {
        if self.ensure_connected().is_err() {
            return Vec::new();
        }
        self.state().positions.values().cloned().collect()
    }

    async fn tick(&self, symbol: &str) -> Option<Tick> {
        self.ensure_connected().ok()?;
        let state = self.state();
        let sym = state.symbols.get(symbol)?;
        if !sym.selected {
            return None;
        }
        sym.tick
    }

    async fn candles(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Option<Vec<Candle>> {
        self.ensure_connected().ok()?;
        let state = self.state();
        let series = state.symbols.get(symbol)?.candles.get(&timeframe)?;
        let start = series.len().saturating_sub(count);
        Some(series[start..].to_vec())
    }

    async fn symbol_info(&self, symbol: &str) -> Option<SymbolInfo> {
        self.ensure_connected().ok()?;
        self.state().symbols.get(symbol).map(|s| s.info.clone())
    }

    async fn select_symbol(&self, symbol: &str) -> bool {
        if self.ensure_connected().is_err() {
            return false;
        }
        match self.state().symbols.get_mut(symbol) {
            Some(sym) => {
                sym.selected = true;
                true
            }
            None => false,
        }
    }

    async fn open_order(&self, request: &OrderRequest) -> Result<OrderFill, GatewayError> {
        self.ensure_connected()?;
        let mut state = self.state();
        state.orders_sent += 1;

        if let Some(max) = state.max_positions {
            if state.positions.len() >= max {
                return Err(GatewayError::MaxPositions(max));
            }
        }
        if let Some(reason) = &state.reject_reason {
            return Err(GatewayError::Rejected {
                code: RETCODE_REJECT,
                message: reason.clone(),
            });
        }

        let sym = state
            .symbols
            .get_mut(&request.symbol)
            .ok_or_else(|| GatewayError::SymbolNotFound(request.symbol.clone()))?;
        sym.selected = true;
        let tick = sym
            .tick
            .ok_or_else(|| GatewayError::NoPrice(request.symbol.clone()))?;
        let info = sym.info.clone();

        if request.volume < info.volume_min || request.volume > info.volume_max {
            return Err(GatewayError::Rejected {
                code: RETCODE_INVALID_VOLUME,
                message: format!("Invalid volume {}", request.volume),
            });
        }

        let price = match request.side {
            OrderSide::Buy => tick.ask,
            OrderSide::Sell => tick.bid,
        };
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        let mut position = Position {
            ticket,
            symbol: request.symbol.clone(),
            side: request.side,
            volume: request.volume,
            open_price: price,
            current_price: price,
            profit: Decimal::ZERO,
            swap: Decimal::ZERO,
            comment: request.comment.clone(),
            opened_at: Utc::now(),
        };
        let (current, profit) = mark_to_market(&position, &info, tick.bid, tick.ask);
        position.current_price = current;
        position.profit = profit;
        state.positions.insert(ticket, position);

        debug!(
            ticket,
            symbol = %request.symbol,
            side = %request.side,
            volume = %request.volume,
            price,
            "Paper order filled"
        );

        Ok(OrderFill {
            ticket,
            price,
            volume: request.volume,
        })
    }

    async fn close_order(&self, ticket: u64) -> Result<ClosedPosition, GatewayError> {
        self.ensure_connected()?;
        let mut state = self.state();
        Self::close_locked(&mut state, ticket)
    }

    async fn close_all_orders(&self) -> CloseAllSummary {
        let mut summary = CloseAllSummary::default();
        if self.ensure_connected().is_err() {
            return summary;
        }

        let mut state = self.state();
        let tickets: Vec<u64> = state.positions.keys().copied().collect();
        for ticket in tickets {
            match Self::close_locked(&mut state, ticket) {
                Ok(closed) => {
                    summary.closed += 1;
                    summary.realized += closed.profit;
                }
                Err(e) => summary.errors.push(CloseFailure {
                    ticket,
                    error: e.to_string(),
                }),
            }
        }
        summary
    }
}
