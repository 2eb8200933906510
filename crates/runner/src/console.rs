//! Line-oriented operator console
//!
//! Reads commands from stdin and drives the bridge:
//!
//! ```text
//! refresh                                   market and account snapshot
//! algo [range] <on|off>                     configure the platform algo
//! limit <price> [size]                      limit order via the command pipe
//! mid <buy|sell> [size]                     mid-price order via the command pipe
//! order <symbol> <buy|sell> <price> <volume> [sl] [tp]
//!                                           tracked order via the event pipes
//! cancel <order_id>                         cancel a pending tracked order
//! orders                                    pending, active and history
//! status                                    link state and order counts
//! help | quit
//! ```

use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;

use hermes_core::{Order, OrderId, OrderSpec, Side};
use hermes_gateway::{Response, Transport};
use log::info;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};

use crate::bridge::Bridge;

pub const HELP: &str = "\
Commands:
  refresh
  algo [range] <on|off>
  limit <price> [size]
  mid <buy|sell> [size]
  order <symbol> <buy|sell> <price> <volume> [stop_loss] [take_profit]
  cancel <order_id>
  orders
  status
  help
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Refresh,
    Algo { range: Option<Decimal>, active: bool },
    Limit { price: Decimal, size: Option<Decimal> },
    MidPrice { side: Side, size: Option<Decimal> },
    Order(OrderSpec),
    Cancel(OrderId),
    Orders,
    Status,
    Help,
    Quit,
}

/// Parse one input line; blank lines are `Ok(None)`
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("refresh", []) => ConsoleCommand::Refresh,
        ("algo", [state]) => ConsoleCommand::Algo {
            range: None,
            active: switch(state)?,
        },
        ("algo", [range, state]) => ConsoleCommand::Algo {
            range: Some(number("range", range)?),
            active: switch(state)?,
        },
        ("limit", [price]) => ConsoleCommand::Limit {
            price: number("price", price)?,
            size: None,
        },
        ("limit", [price, size]) => ConsoleCommand::Limit {
            price: number("price", price)?,
            size: Some(number("size", size)?),
        },
        ("mid", [side]) => ConsoleCommand::MidPrice {
            side: Side::from_str(side)?,
            size: None,
        },
        ("mid", [side, size]) => ConsoleCommand::MidPrice {
            side: Side::from_str(side)?,
            size: Some(number("size", size)?),
        },
        ("order", [symbol, side, price, volume, protective @ ..]) if protective.len() <= 2 => {
            let mut spec = OrderSpec::limit(
                *symbol,
                Side::from_str(side)?,
                number("price", price)?,
                number("volume", volume)?,
            );
            if let Some(stop_loss) = protective.first() {
                spec = spec.with_stop_loss(number("stop loss", stop_loss)?);
            }
            if let Some(take_profit) = protective.get(1) {
                spec = spec.with_take_profit(number("take profit", take_profit)?);
            }
            ConsoleCommand::Order(spec)
        }
        ("cancel", [id]) => ConsoleCommand::Cancel(OrderId::new(*id)),
        ("orders", []) => ConsoleCommand::Orders,
        ("status", []) => ConsoleCommand::Status,
        ("help" | "?", _) => ConsoleCommand::Help,
        ("quit" | "exit", []) => ConsoleCommand::Quit,
        (other, _) => return Err(format!("unrecognized command '{other}', try 'help'")),
    };
    Ok(Some(command))
}

fn number(field: &str, raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw).map_err(|_| format!("invalid {field}: {raw}"))
}

fn switch(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(format!("expected on or off, got {other}")),
    }
}

/// Run a parsed command against the bridge and return the lines to show
pub async fn execute<T: Transport>(bridge: &Bridge<T>, command: ConsoleCommand) -> Vec<String> {
    let config = bridge.config();
    match command {
        ConsoleCommand::Refresh => match bridge.refresh_snapshot().await {
            Ok(snapshot) => snapshot.summary_lines(),
            Err(e) => vec![format!("Failed to refresh data: {e}")],
        },
        ConsoleCommand::Algo { range, active } => {
            let range = range.unwrap_or(config.default_algo_range);
            info!("Setting algorithm: range={}, active={}", range, active);
            let response = bridge.connection().set_algo(range, active).await;
            outcome(&response, "Algorithm config updated", "Failed to update algorithm")
        }
        ConsoleCommand::Limit { price, size } => {
            let size = size.unwrap_or(config.default_order_size);
            info!("Placing limit order: price={}, size={}", price, size);
            let response = bridge.connection().place_limit(price, size).await;
            outcome(&response, "Limit order placed", "Failed to place limit order")
        }
        ConsoleCommand::MidPrice { side, size } => {
            let size = size.unwrap_or(config.default_order_size);
            info!("Placing mid-price order: size={}, side={}", size, side);
            let response = bridge.connection().place_mid_price(size, side).await;
            outcome(&response, "Mid-price order placed", "Failed to place mid-price order")
        }
        ConsoleCommand::Order(spec) => match bridge.ledger().submit(spec).await {
            Ok(id) => vec![format!("Order {id} submitted")],
            Err(e) => vec![format!("Order not placed: {e}")],
        },
        ConsoleCommand::Cancel(id) => {
            if bridge.ledger().cancel(&id).await {
                vec![format!("Cancel requested for {id}")]
            } else {
                vec![format!("Order {id} is not pending, nothing sent")]
            }
        }
        ConsoleCommand::Orders => {
            let ledger = bridge.ledger();
            let mut lines = Vec::new();
            for (label, orders) in [
                ("pending", ledger.pending_orders()),
                ("active", ledger.active_orders()),
                ("history", ledger.order_history()),
            ] {
                lines.extend(orders.iter().map(|order| order_line(label, order)));
            }
            if lines.is_empty() {
                lines.push("No orders".to_string());
            }
            lines
        }
        ConsoleCommand::Status => {
            let (pending, active, history) = bridge.ledger().counts();
            let mut lines = vec![
                format!("Command link: {:?}", bridge.connection().state()),
                format!("Event link: {:?}", bridge.health().current()),
                format!("Orders: {pending} pending, {active} active, {history} in history"),
            ];
            match bridge.latest_snapshot() {
                Some(snapshot) => lines.extend(snapshot.summary_lines()),
                None => lines.push("No refresh yet".to_string()),
            }
            lines
        }
        ConsoleCommand::Help => HELP.lines().map(str::to_string).collect(),
        ConsoleCommand::Quit => Vec::new(),
    }
}

fn outcome(response: &Response, done: &str, failed: &str) -> Vec<String> {
    if response.is_success() {
        vec![done.to_string()]
    } else {
        vec![format!("{failed}: {}", response.error_message())]
    }
}

fn order_line(bucket: &str, order: &Order) -> String {
    format!(
        "{:<8} {} {} {} {} @ {} [{}]",
        bucket, order.id, order.symbol, order.direction, order.volume, order.price, order.status
    )
}

/// Serve stdin until `quit`, end of input, or shutdown
pub async fn run<T: Transport>(bridge: Arc<Bridge<T>>, mut shutdown: watch::Receiver<bool>) {
    let mut lines = spawn_stdin_reader();
    println!("{HELP}");

    loop {
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = shutdown.changed() => break,
        };
        let Some(line) = line else {
            break;
        };

        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(command)) => {
                for output in execute(bridge.as_ref(), command).await {
                    println!("{output}");
                }
            }
            Err(e) => println!("{e}"),
        }
    }
}

// Plain thread: a blocked stdin read must not hold up runtime shutdown
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("Console input failed: {e}");
                    break;
                }
            }
        }
    });
    rx
}
