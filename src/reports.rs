// src/reports.rs
//
// Monthly work-order report view. Income, expense and profit figures come
// from the backend per work order; this section filters to the current month,
// totals them and can write the report out as CSV.

use chrono::Datelike;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::api_client::{ApiError, BackendApi, Trabajo};
use crate::clock::Clock;
use crate::reset_scheduler::ResetEvent;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("CSV writing failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReporteMensual {
    pub year: i32,
    pub month: u32,
    pub total_trabajos: usize,
    pub total_ingresos: Decimal,
    pub total_gastos: Decimal,
    pub ganancia_neta: Decimal,
    /// Percentage change of income against the previous month, when that
    /// month has data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variacion_ingresos: Option<Decimal>,
}

#[derive(Clone)]
pub struct ReportsSection {
    api: Arc<dyn BackendApi>,
    clock: Arc<dyn Clock>,
    trabajos: Arc<Mutex<Vec<Trabajo>>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl ReportsSection {
    pub fn new(api: Arc<dyn BackendApi>, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            clock,
            trabajos: Arc::new(Mutex::new(Vec::new())),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn refresh(&self) -> Result<(), ApiError> {
        let trabajos = self.api.fetch_trabajos().await?;
        info!("Reports section loaded {} trabajos", trabajos.len());
        *self.trabajos.lock().unwrap() = trabajos;
        *self.last_error.lock().unwrap() = None;
        Ok(())
    }

    pub fn clear(&self) {
        self.trabajos.lock().unwrap().clear();
        info!("Reports section cleared for the new period");
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    /// Work orders belonging to the current month.
    pub fn trabajos_del_mes(&self) -> Vec<Trabajo> {
        let now = self.clock.now();
        self.trabajos
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.fecha.month() == now.month() && t.fecha.year() == now.year())
            .cloned()
            .collect()
    }

    /// Monthly totals plus the income variation against the previous month.
    pub fn resumen_mensual(&self) -> ReporteMensual {
        let now = self.clock.now();
        let (prev_year, prev_month) = previous_month(now.year(), now.month());

        let trabajos = self.trabajos.lock().unwrap();
        let mut resumen = ReporteMensual {
            year: now.year(),
            month: now.month(),
            ..ReporteMensual::default()
        };
        let mut prev_ingresos = Decimal::ZERO;
        let mut prev_has_data = false;

        for trabajo in trabajos.iter() {
            if trabajo.fecha.year() == now.year() && trabajo.fecha.month() == now.month() {
                resumen.total_trabajos += 1;
                resumen.total_ingresos += trabajo.costo;
                resumen.total_gastos += trabajo.total_gastos;
                resumen.ganancia_neta += trabajo.ganancia;
            } else if trabajo.fecha.year() == prev_year && trabajo.fecha.month() == prev_month {
                prev_ingresos += trabajo.costo;
                prev_has_data = true;
            }
        }

        if prev_has_data && prev_ingresos > Decimal::ZERO {
            resumen.variacion_ingresos = Some(
                (resumen.total_ingresos - prev_ingresos) * Decimal::ONE_HUNDRED / prev_ingresos,
            );
        }
        resumen
    }

    /// Writes the current month's work orders as CSV, one row per order.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<(), ReportError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record([
            "orden",
            "fecha",
            "matricula",
            "cliente",
            "descripcion",
            "ingreso",
            "gastos",
            "ganancia",
        ])?;
        for trabajo in self.trabajos_del_mes() {
            csv_writer.write_record([
                format!("WO-{:03}", trabajo.id),
                trabajo.fecha.to_string(),
                trabajo.matricula_carro.clone(),
                trabajo
                    .cliente_nombre
                    .clone()
                    .unwrap_or_else(|| "Sin cliente".to_string()),
                trabajo.descripcion.clone(),
                trabajo.costo.to_string(),
                trabajo.total_gastos.to_string(),
                trabajo.ganancia.to_string(),
            ])?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub async fn handle_reset(&self, event: &ResetEvent) {
        info!(
            "Reports section resetting for {} ({}-{:02})",
            event.event,
            event.year,
            event.month + 1
        );
        self.clear();
        if let Err(e) = self.refresh().await {
            error!("Reports refresh after reset failed: {}", e);
            *self.last_error.lock().unwrap() = Some(e.to_string());
        }
    }
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

pub async fn run_reset_listener(
    section: ReportsSection,
    mut events: broadcast::Receiver<ResetEvent>,
) {
    info!("Reports section subscribed to reset events");
    loop {
        match events.recv().await {
            Ok(event) => section.handle_reset(&event).await,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Reports reset listener lagged {} events", missed);
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("Reset channel closed; reports listener exiting");
                break;
            }
        }
    }
}
