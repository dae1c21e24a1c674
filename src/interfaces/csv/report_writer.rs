use crate::domain::transaction::{PaymentMethod, PaymentStatus, Transaction};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// One line of the final replay report.
#[derive(Debug, Serialize, PartialEq)]
pub struct ReportRow {
    pub order: String,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub refunded: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

impl From<&Transaction> for ReportRow {
    fn from(tx: &Transaction) -> Self {
        Self {
            order: tx.order_id.clone(),
            status: tx.status,
            amount: tx.amount.value(),
            refunded: tx.refunded_amount,
            method: tx.method,
            reference: tx.external_reference.clone(),
        }
    }
}

/// Writes transaction state as CSV.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(dest: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(dest),
        }
    }

    pub fn write_transactions<'a, I>(&mut self, transactions: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        for tx in transactions {
            self.writer.serialize(ReportRow::from(tx))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
