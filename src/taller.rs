// src/taller.rs
//
// Workshop expenses and payroll view state, scoped to the current month.
// The backend keeps full history; this section only caches and aggregates
// the slice the taller cards display, and re-fetches after a reset.

use chrono::Datelike;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::api_client::{ApiError, BackendApi, GastoTaller, PagoSalario};
use crate::clock::Clock;
use crate::reset_scheduler::ResetEvent;

#[derive(Debug, Clone, Default, Serialize)]
pub struct GastosStats {
    pub total_mes: Decimal,
    pub gastos_mes: usize,
    pub por_categoria: HashMap<String, Decimal>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SalariosStats {
    pub total_mes: Decimal,
    pub pagos_mes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TallerResumen {
    pub gastos: GastosStats,
    pub salarios: SalariosStats,
    pub semana_pago: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Clones share the same caches; one instance is handed to the HTTP state
/// and another to the reset listener task.
#[derive(Clone)]
pub struct TallerSection {
    api: Arc<dyn BackendApi>,
    clock: Arc<dyn Clock>,
    gastos: Arc<Mutex<Vec<GastoTaller>>>,
    pagos: Arc<Mutex<Vec<PagoSalario>>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl TallerSection {
    pub fn new(api: Arc<dyn BackendApi>, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            clock,
            gastos: Arc::new(Mutex::new(Vec::new())),
            pagos: Arc::new(Mutex::new(Vec::new())),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Re-fetches both lists from the backend, replacing the caches.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let gastos = self.api.fetch_gastos_taller().await?;
        let pagos = self.api.fetch_pagos_salarios().await?;
        info!(
            "Taller section loaded {} gastos and {} pagos",
            gastos.len(),
            pagos.len()
        );
        *self.gastos.lock().unwrap() = gastos;
        *self.pagos.lock().unwrap() = pagos;
        *self.last_error.lock().unwrap() = None;
        Ok(())
    }

    /// Drops the cached lists. Backend history is untouched.
    pub fn clear(&self) {
        self.gastos.lock().unwrap().clear();
        self.pagos.lock().unwrap().clear();
        info!("Taller section cleared for the new period");
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    /// Expense stats for the month the clock currently sits in.
    pub fn stats_gastos(&self) -> GastosStats {
        let now = self.clock.now();
        let gastos = self.gastos.lock().unwrap();
        let mut stats = GastosStats::default();
        for gasto in gastos
            .iter()
            .filter(|g| g.fecha_gasto.month() == now.month() && g.fecha_gasto.year() == now.year())
        {
            stats.total_mes += gasto.monto;
            stats.gastos_mes += 1;
            *stats
                .por_categoria
                .entry(gasto.categoria.clone())
                .or_insert(Decimal::ZERO) += gasto.monto;
        }
        stats
    }

    /// Salary stats for the current month.
    pub fn stats_salarios(&self) -> SalariosStats {
        let now = self.clock.now();
        let pagos = self.pagos.lock().unwrap();
        let mut stats = SalariosStats::default();
        for pago in pagos
            .iter()
            .filter(|p| p.fecha_pago.month() == now.month() && p.fecha_pago.year() == now.year())
        {
            stats.total_mes += pago.monto_salario;
            stats.pagos_mes += 1;
        }
        stats
    }

    /// Current pay week label, e.g. "2025-W02". The week number counts
    /// calendar rows of the month grid, offset by the weekday of the 1st.
    pub fn current_pay_week(&self) -> String {
        let now = self.clock.now();
        let first_of_month = now
            .date()
            .with_day(1)
            .expect("day 1 is valid in every month");
        let offset = first_of_month.weekday().num_days_from_sunday();
        let week = (now.day() + offset).div_ceil(7);
        format!("{}-W{:02}", now.year(), week)
    }

    pub fn resumen(&self) -> TallerResumen {
        TallerResumen {
            gastos: self.stats_gastos(),
            salarios: self.stats_salarios(),
            semana_pago: self.current_pay_week(),
            last_error: self.last_error(),
        }
    }

    /// Reset reaction: drop the period-scoped caches and re-issue the
    /// standard fetches for the new period. Fetch failures are kept for the
    /// summary endpoint instead of bubbling out of the listener.
    pub async fn handle_reset(&self, event: &ResetEvent) {
        info!(
            "Taller section resetting for {} ({}-{:02})",
            event.event,
            event.year,
            event.month + 1
        );
        self.clear();
        if let Err(e) = self.refresh().await {
            error!("Taller refresh after reset failed: {}", e);
            *self.last_error.lock().unwrap() = Some(e.to_string());
        }
    }
}

/// Listener task: consumes reset events until the scheduler goes away.
pub async fn run_reset_listener(
    section: TallerSection,
    mut events: broadcast::Receiver<ResetEvent>,
) {
    info!("Taller section subscribed to reset events");
    loop {
        match events.recv().await {
            Ok(event) => section.handle_reset(&event).await,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Taller reset listener lagged {} events", missed);
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("Reset channel closed; taller listener exiting");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::{MecanicoEstadisticas, Trabajo};
    use crate::clock::TestClock;
    use chrono::{NaiveDate, NaiveDateTime};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Canned backend: serves fixed lists and counts fetches.
    struct MockBackend {
        gastos: Vec<GastoTaller>,
        pagos: Vec<PagoSalario>,
        fetch_count: AtomicUsize,
    }

    impl MockBackend {
        fn new(gastos: Vec<GastoTaller>, pagos: Vec<PagoSalario>) -> Self {
            Self {
                gastos,
                pagos,
                fetch_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl BackendApi for MockBackend {
        async fn fetch_trabajos(&self) -> Result<Vec<Trabajo>, ApiError> {
            Ok(Vec::new())
        }
        async fn fetch_mecanicos(&self) -> Result<Vec<crate::api_client::Mecanico>, ApiError> {
            Ok(Vec::new())
        }
        async fn fetch_estadisticas_mecanico(
            &self,
            _id: i64,
        ) -> Result<MecanicoEstadisticas, ApiError> {
            Ok(MecanicoEstadisticas::default())
        }
        async fn fetch_gastos_taller(&self) -> Result<Vec<GastoTaller>, ApiError> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            Ok(self.gastos.clone())
        }
        async fn fetch_pagos_salarios(&self) -> Result<Vec<PagoSalario>, ApiError> {
            Ok(self.pagos.clone())
        }
    }

    fn gasto(id: i64, fecha: &str, monto: Decimal, categoria: &str) -> GastoTaller {
        GastoTaller {
            id,
            descripcion: format!("Gasto {}", id),
            monto,
            categoria: categoria.to_string(),
            fecha_gasto: NaiveDateTime::parse_from_str(fecha, "%Y-%m-%d %H:%M:%S").unwrap(),
        }
    }

    fn pago(id: i64, fecha: &str, monto: Decimal) -> PagoSalario {
        PagoSalario {
            id,
            id_mecanico: 1,
            monto_salario: monto,
            semana_pago: "1".to_string(),
            fecha_pago: NaiveDate::parse_from_str(fecha, "%Y-%m-%d").unwrap(),
            nombre_mecanico: None,
        }
    }

    fn section_at(clock_time: &str, backend: Arc<MockBackend>) -> (TallerSection, TestClock) {
        let clock = TestClock::new(clock_time);
        let section = TallerSection::new(backend, Arc::new(clock.clone()));
        (section, clock)
    }

    #[tokio::test]
    async fn stats_only_count_the_current_month() {
        let backend = Arc::new(MockBackend::new(
            vec![
                gasto(1, "2025-07-05 10:00:00", dec!(45000), "Servicios"),
                gasto(2, "2025-07-20 09:00:00", dec!(15000), "Repuestos"),
                gasto(3, "2025-06-28 12:00:00", dec!(99000), "Servicios"),
            ],
            vec![
                pago(1, "2025-07-11", dec!(120000)),
                pago(2, "2025-06-27", dec!(110000)),
            ],
        ));
        let (section, _clock) = section_at("2025-07-22 08:00:00", backend);
        section.refresh().await.unwrap();

        let gastos = section.stats_gastos();
        assert_eq!(gastos.total_mes, dec!(60000));
        assert_eq!(gastos.gastos_mes, 2);
        assert_eq!(gastos.por_categoria["Servicios"], dec!(45000));
        assert_eq!(gastos.por_categoria["Repuestos"], dec!(15000));

        let salarios = section.stats_salarios();
        assert_eq!(salarios.total_mes, dec!(120000));
        assert_eq!(salarios.pagos_mes, 1);
    }

    #[tokio::test]
    async fn reset_clears_and_refetches() {
        let backend = Arc::new(MockBackend::new(
            vec![gasto(1, "2025-07-05 10:00:00", dec!(45000), "Servicios")],
            vec![],
        ));
        let (section, _clock) = section_at("2025-07-22 08:00:00", backend.clone());
        section.refresh().await.unwrap();

        let event = ResetEvent {
            event: "monthlyReset",
            reset_date: "2025-08-04T00:01:00".to_string(),
            month: 7,
            year: 2025,
            quincena: None,
        };
        section.handle_reset(&event).await;

        // One fetch from the initial refresh, one from the reset reaction.
        assert_eq!(backend.fetch_count.load(Ordering::SeqCst), 2);
        assert_eq!(section.gastos.lock().unwrap().len(), 1);
        assert!(section.last_error().is_none());
    }

    #[test]
    fn pay_week_label_matches_the_month_grid() {
        // 2025-01-01 is a Wednesday (offset 3): day 10 lands in week 2.
        let backend = Arc::new(MockBackend::new(vec![], vec![]));
        let (section, clock) = section_at("2025-01-10 12:00:00", backend);
        assert_eq!(section.current_pay_week(), "2025-W02");

        // 2025-06-01 is a Sunday (offset 0): day 1 is week 1, day 30 week 5.
        clock.set_time("2025-06-01 08:00:00");
        assert_eq!(section.current_pay_week(), "2025-W01");
        clock.set_time("2025-06-30 08:00:00");
        assert_eq!(section.current_pay_week(), "2025-W05");
    }

    #[tokio::test]
    async fn clear_empties_the_caches() {
        let backend = Arc::new(MockBackend::new(
            vec![gasto(1, "2025-07-05 10:00:00", dec!(45000), "Servicios")],
            vec![pago(1, "2025-07-11", dec!(120000))],
        ));
        let (section, _clock) = section_at("2025-07-22 08:00:00", backend);
        section.refresh().await.unwrap();
        section.clear();
        assert_eq!(section.stats_gastos().gastos_mes, 0);
        assert_eq!(section.stats_salarios().pagos_mes, 0);
    }
}
