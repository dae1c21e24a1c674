use crate::domain::transaction::PaymentMethod;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One operation in a replay command log.
#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Open a payment for the order.
    Create,
    /// Script the simulated gateway's remote status for the order's payment.
    Remote,
    /// Poll the gateway and apply the mapped status.
    Confirm,
    Cancel,
    Refund,
}

/// A replay command row: `op, order, amount, currency, method, argument`.
///
/// `argument` carries the remote status for `remote` rows and the optional
/// reason for `refund` rows.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ReplayCommand {
    pub op: CommandKind,
    pub order: String,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub method: Option<PaymentMethod>,
    pub argument: Option<String>,
}

/// Reads replay commands from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over
/// `Result<ReplayCommand>`. It handles whitespace trimming and flexible
/// record lengths automatically.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes commands.
    pub fn commands(self) -> impl Iterator<Item = Result<ReplayCommand>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
