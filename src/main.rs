use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payflow::application::orchestrator::PaymentOrchestrator;
use payflow::domain::ports::TransactionStoreRef;
use payflow::domain::transaction::{Amount, PaymentMethod, PaymentRequest};
use payflow::error::PaymentError;
use payflow::gateways::GatewayRegistry;
use payflow::gateways::mock::MockGateway;
use payflow::infrastructure::in_memory::InMemoryTransactionStore;
use payflow::infrastructure::publisher::TracingEventPublisher;
use payflow::interfaces::csv::command_reader::{CommandKind, CommandReader, ReplayCommand};
use payflow::interfaces::csv::report_writer::ReportWriter;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Replays a CSV command log through the payment orchestrator against
/// simulated gateways and prints the final transaction state as CSV.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input replay commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Log to stderr; stdout carries the CSV report.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let store: TransactionStoreRef = match cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(db_path) => Arc::new(
            payflow::infrastructure::rocksdb::RocksDbTransactionStore::open(db_path)
                .into_diagnostic()?,
        ),
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            return Err(miette::miette!(
                "persistent storage requires building with --features storage-rocksdb"
            ));
        }
        None => Arc::new(InMemoryTransactionStore::new()),
    };

    // One simulated gateway per routable method.
    let mut gateways: HashMap<PaymentMethod, Arc<MockGateway>> = HashMap::new();
    let mut registry = GatewayRegistry::new();
    for method in [PaymentMethod::Stripe, PaymentMethod::Paypal] {
        let gateway = Arc::new(MockGateway::new(method));
        registry.register(gateway.clone());
        gateways.insert(method, gateway);
    }

    let orchestrator =
        PaymentOrchestrator::new(store, registry, Arc::new(TracingEventPublisher));

    // Process commands
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    let mut orders: Vec<String> = Vec::new();
    for command_result in reader.commands() {
        match command_result {
            Ok(command) => {
                if command.op == CommandKind::Create && !orders.contains(&command.order) {
                    orders.push(command.order.clone());
                }
                if let Err(e) = run_command(&orchestrator, &gateways, command).await {
                    eprintln!("Error processing command: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    // Collect final state, in order-of-first-create order.
    let mut transactions = Vec::new();
    for order in &orders {
        match orchestrator.get_by_order_id(order).await {
            Ok(tx) => transactions.push(tx),
            Err(PaymentError::NotFound(_)) => {}
            Err(e) => eprintln!("Error reading transaction: {}", e),
        }
    }

    // Output final state
    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    writer.write_transactions(&transactions).into_diagnostic()?;

    Ok(())
}

async fn run_command(
    orchestrator: &PaymentOrchestrator,
    gateways: &HashMap<PaymentMethod, Arc<MockGateway>>,
    command: ReplayCommand,
) -> payflow::error::Result<()> {
    match command.op {
        CommandKind::Create => {
            let amount = command.amount.ok_or_else(|| {
                PaymentError::ValidationError("create requires an amount".to_string())
            })?;
            let request = PaymentRequest {
                order_id: command.order,
                user_id: "replay".to_string(),
                amount: Amount::new(amount)?,
                currency: command.currency.unwrap_or_else(|| "USD".to_string()),
                method: command.method.unwrap_or(PaymentMethod::Stripe),
                customer: Default::default(),
                billing_address: None,
                description: command.argument,
                success_url: None,
                cancel_url: None,
                metadata: None,
            };
            orchestrator.create(request).await?;
        }
        CommandKind::Remote => {
            let status = command.argument.ok_or_else(|| {
                PaymentError::ValidationError("remote requires a status argument".to_string())
            })?;
            let tx = orchestrator.get_by_order_id(&command.order).await?;
            let reference = tx.external_reference.ok_or_else(|| {
                PaymentError::ValidationError(format!(
                    "order {} has no remote payment",
                    tx.order_id
                ))
            })?;
            let gateway = gateways.get(&tx.method).ok_or_else(|| {
                PaymentError::UnsupportedMethod(tx.method)
            })?;
            gateway.set_remote_status(&reference, &status).await;
        }
        CommandKind::Confirm => {
            let tx = orchestrator.get_by_order_id(&command.order).await?;
            orchestrator.confirm(tx.id).await?;
        }
        CommandKind::Cancel => {
            let tx = orchestrator.get_by_order_id(&command.order).await?;
            orchestrator.cancel(tx.id).await?;
        }
        CommandKind::Refund => {
            let amount = command.amount.ok_or_else(|| {
                PaymentError::ValidationError("refund requires an amount".to_string())
            })?;
            let tx = orchestrator.get_by_order_id(&command.order).await?;
            orchestrator
                .refund(tx.id, Amount::new(amount)?, command.argument)
                .await?;
        }
    }
    Ok(())
}
