use clap::Parser;
use condoledger::application::ledger::{InstallmentFilter, InstallmentLedger};
use condoledger::application::locks::KeyedLocks;
use condoledger::application::orchestrator::{
    ConfirmOutcome, OnlinePaymentOrchestrator,
};
use condoledger::application::recorder::PaymentRecorder;
use condoledger::domain::installment::{InstallmentId, UnitId};
use condoledger::domain::money::Amount;
use condoledger::domain::ports::{LedgerStore, SharedCardGateway, SharedLedgerStore};
use condoledger::error::{BillingError, Result as BillingResult};
use condoledger::infrastructure::in_memory::InMemoryLedgerStore;
use condoledger::infrastructure::in_memory_gateway::InMemoryCardGateway;
use condoledger::interfaces::csv::command_reader::{Command, CommandReader, OpKind};
use condoledger::interfaces::csv::installment_reader::InstallmentReader;
use condoledger::interfaces::csv::summary_writer::EstadoCuentaWriter;
use miette::{IntoDiagnostic, Result, miette};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Installment seed CSV (output of the billing-generation process)
    installments: PathBuf,

    /// Ledger command CSV to replay (pago / init / confirm / cancel / revertir)
    commands: PathBuf,

    /// Restrict output and command defaulting to one unit
    #[arg(long)]
    unidad: Option<UnitId>,

    /// Print the account summary as JSON instead of the cuota table
    #[arg(long)]
    resumen: bool,

    /// Currency code sent to the card gateway
    #[arg(long, default_value = "USD")]
    currency: String,

    /// Upper bound in milliseconds for any single gateway call
    #[arg(long, default_value_t = 10_000)]
    gateway_timeout_ms: u64,
}

struct Services {
    ledger: InstallmentLedger,
    recorder: PaymentRecorder,
    orchestrator: OnlinePaymentOrchestrator,
    gateway: Arc<InMemoryCardGateway>,
    default_unit: UnitId,
}

impl Services {
    async fn apply(&self, command: Command) -> BillingResult<()> {
        match command.op {
            OpKind::Pago => {
                let cuota = require(command.cuota, "cuota")?;
                let monto = Amount::new(require(command.monto, "monto")?)?;
                self.recorder
                    .record_payment(cuota, monto, command.medio, command.referencia)
                    .await?;
            }
            OpKind::Init => {
                let cuota = self.resolve_target(command.cuota).await?;
                let monto = command.monto.map(Amount::new).transpose()?;
                let initiated = self.orchestrator.initiate(cuota, monto).await?;
                tracing::info!(
                    intent = %initiated.intent.external_id,
                    client_secret = %initiated.client_secret,
                    "client secret issued"
                );
            }
            OpKind::Confirm => {
                let external_id = require(command.referencia, "referencia")?;
                let outcome = require(command.resultado, "resultado")?;
                // The in-memory gateway stands in for the card network, so a
                // reported success is reflected there before confirmation.
                if outcome == ConfirmOutcome::Succeeded {
                    self.gateway.settle(&external_id).await?;
                }
                self.orchestrator.confirm(&external_id, outcome).await?;
            }
            OpKind::Cancel => {
                let external_id = require(command.referencia, "referencia")?;
                self.orchestrator.cancel(&external_id).await?;
            }
            OpKind::Revertir => {
                let reference = require(command.referencia, "referencia")?;
                let pago = reference.parse().map_err(|_| {
                    BillingError::Validation(format!("{reference} is not a payment id"))
                })?;
                self.recorder.invalidate_payment(pago).await?;
            }
        }
        Ok(())
    }

    /// An `init` without a cuota short-circuits to the first payable one,
    /// resolved against the authoritative ledger.
    async fn resolve_target(&self, chosen: Option<InstallmentId>) -> BillingResult<InstallmentId> {
        if let Some(id) = chosen {
            return Ok(id);
        }
        self.ledger
            .first_payable_for_unit(self.default_unit)
            .await?
            .map(|row| row.installment.id)
            .ok_or_else(|| {
                BillingError::Validation(format!(
                    "unidad {} has no payable cuotas",
                    self.default_unit
                ))
            })
    }
}

fn require<T>(value: Option<T>, field: &str) -> BillingResult<T> {
    value.ok_or_else(|| BillingError::Validation(format!("command is missing '{field}'")))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let store: SharedLedgerStore = Arc::new(InMemoryLedgerStore::new());
    let seed = File::open(&cli.installments).into_diagnostic()?;
    let mut seeded = 0usize;
    for installment in InstallmentReader::new(seed).installments() {
        let installment = installment.into_diagnostic()?;
        store.insert_installment(installment).await.into_diagnostic()?;
        seeded += 1;
    }
    tracing::info!(cuotas = seeded, "ledger seeded");

    let units = store.units().await.into_diagnostic()?;
    let default_unit = match cli.unidad.or_else(|| units.first().copied()) {
        Some(unit) => unit,
        None => return Err(miette!("no installments were seeded")),
    };

    let gateway = Arc::new(InMemoryCardGateway::new());
    let gateway_port: SharedCardGateway = gateway.clone();
    let installment_locks = Arc::new(KeyedLocks::new());
    let services = Services {
        ledger: InstallmentLedger::new(store.clone()),
        recorder: PaymentRecorder::new(store.clone(), installment_locks.clone()),
        orchestrator: OnlinePaymentOrchestrator::new(
            store.clone(),
            gateway_port,
            installment_locks,
            cli.currency.clone(),
            Duration::from_millis(cli.gateway_timeout_ms),
        ),
        gateway,
        default_unit,
    };

    let commands = File::open(&cli.commands).into_diagnostic()?;
    for command in CommandReader::new(commands).commands() {
        match command {
            Ok(command) => {
                if let Err(e) = services.apply(command).await {
                    eprintln!("error processing command: {e}");
                }
            }
            Err(e) => {
                eprintln!("error reading command: {e}");
            }
        }
    }

    let stdout = io::stdout();
    if cli.resumen {
        let summary = services
            .ledger
            .account_summary(default_unit)
            .await
            .into_diagnostic()?;
        serde_json::to_writer_pretty(stdout.lock(), &summary).into_diagnostic()?;
        println!();
    } else {
        let selected: Vec<UnitId> = match cli.unidad {
            Some(unit) => vec![unit],
            None => units,
        };
        let mut rows = Vec::new();
        for unit in selected {
            rows.extend(
                services
                    .ledger
                    .list_installments(&InstallmentFilter::for_unit(unit))
                    .await
                    .into_diagnostic()?,
            );
        }
        EstadoCuentaWriter::new(stdout.lock())
            .write_rows(&rows)
            .into_diagnostic()?;
    }

    Ok(())
}
