// src/mechanics.rs
//
// Mechanics roster and quincena commission preview. Commission amounts are
// computed by the backend; the preview only surfaces the fetched totals,
// falling back to the flat 2% estimate when a mechanic has no stats yet.

use chrono::Datelike;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::api_client::{ApiError, BackendApi, Mecanico, MecanicoEstadisticas};
use crate::clock::Clock;
use crate::period::BiweeklyScheme;
use crate::reset_scheduler::ResetEvent;

/// Shop-wide default commission rate, in percent.
pub const DEFAULT_COMMISSION_RATE: Decimal = dec!(2.00);

#[derive(Debug, Clone, Serialize)]
pub struct ComisionPreview {
    pub id_mecanico: i64,
    pub nombre: String,
    pub porcentaje_comision: Decimal,
    pub trabajos_completados: i64,
    pub total_ganancias: Decimal,
    pub total_comisiones: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComisionesResumen {
    pub year: i32,
    pub month: u32,
    pub quincena: u8,
    pub mecanicos: Vec<ComisionPreview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Clone)]
pub struct MechanicsSection {
    api: Arc<dyn BackendApi>,
    clock: Arc<dyn Clock>,
    mecanicos: Arc<Mutex<Vec<Mecanico>>>,
    estadisticas: Arc<Mutex<HashMap<i64, MecanicoEstadisticas>>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl MechanicsSection {
    pub fn new(api: Arc<dyn BackendApi>, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            clock,
            mecanicos: Arc::new(Mutex::new(Vec::new())),
            estadisticas: Arc::new(Mutex::new(HashMap::new())),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Re-fetches the roster, then per-mechanic stats. A single mechanic's
    /// stats failing does not discard the rest of the refresh.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let mecanicos = self.api.fetch_mecanicos().await?;
        info!("Mechanics section loaded {} mecanicos", mecanicos.len());

        let mut estadisticas = HashMap::new();
        for mecanico in mecanicos.iter().filter(|m| m.activo) {
            match self.api.fetch_estadisticas_mecanico(mecanico.id).await {
                Ok(stats) => {
                    estadisticas.insert(mecanico.id, stats);
                }
                Err(e) => {
                    warn!(
                        "Could not load stats for mecanico {} ({}): {}",
                        mecanico.id, mecanico.nombre, e
                    );
                }
            }
        }

        *self.mecanicos.lock().unwrap() = mecanicos;
        *self.estadisticas.lock().unwrap() = estadisticas;
        *self.last_error.lock().unwrap() = None;
        Ok(())
    }

    pub fn clear(&self) {
        self.mecanicos.lock().unwrap().clear();
        self.estadisticas.lock().unwrap().clear();
        info!("Mechanics section cleared for the new quincena");
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    /// Commission preview for the quincena the clock currently sits in,
    /// active mechanics only.
    pub fn comisiones_quincena(&self) -> ComisionesResumen {
        let now = self.clock.now();
        let mecanicos = self.mecanicos.lock().unwrap();
        let estadisticas = self.estadisticas.lock().unwrap();

        let previews = mecanicos
            .iter()
            .filter(|m| m.activo)
            .map(|m| {
                let stats = estadisticas.get(&m.id).cloned().unwrap_or_default();
                let total_comisiones = if stats.total_comisiones > Decimal::ZERO {
                    stats.total_comisiones
                } else {
                    // Display-only estimate; the backend remains authoritative.
                    stats.total_ganancias * m.porcentaje_comision / dec!(100)
                };
                ComisionPreview {
                    id_mecanico: m.id,
                    nombre: m.nombre.clone(),
                    porcentaje_comision: m.porcentaje_comision,
                    trabajos_completados: stats.trabajos_completados,
                    total_ganancias: stats.total_ganancias,
                    total_comisiones,
                }
            })
            .collect();

        ComisionesResumen {
            year: now.year(),
            month: now.month(),
            quincena: BiweeklyScheme::quincena_for_day(now.day()),
            mecanicos: previews,
            last_error: self.last_error(),
        }
    }

    pub async fn handle_reset(&self, event: &ResetEvent) {
        info!(
            "Mechanics section resetting for {} (quincena {:?})",
            event.event, event.quincena
        );
        self.clear();
        if let Err(e) = self.refresh().await {
            error!("Mechanics refresh after reset failed: {}", e);
            *self.last_error.lock().unwrap() = Some(e.to_string());
        }
    }
}

pub async fn run_reset_listener(
    section: MechanicsSection,
    mut events: broadcast::Receiver<ResetEvent>,
) {
    info!("Mechanics section subscribed to reset events");
    loop {
        match events.recv().await {
            Ok(event) => section.handle_reset(&event).await,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Mechanics reset listener lagged {} events", missed);
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("Reset channel closed; mechanics listener exiting");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::{GastoTaller, PagoSalario, Trabajo};
    use crate::clock::TestClock;

    struct MockBackend {
        mecanicos: Vec<Mecanico>,
        estadisticas: HashMap<i64, MecanicoEstadisticas>,
    }

    #[async_trait::async_trait]
    impl BackendApi for MockBackend {
        async fn fetch_trabajos(&self) -> Result<Vec<Trabajo>, ApiError> {
            Ok(Vec::new())
        }
        async fn fetch_mecanicos(&self) -> Result<Vec<Mecanico>, ApiError> {
            Ok(self.mecanicos.clone())
        }
        async fn fetch_estadisticas_mecanico(
            &self,
            id: i64,
        ) -> Result<MecanicoEstadisticas, ApiError> {
            match self.estadisticas.get(&id) {
                Some(stats) => Ok(stats.clone()),
                None => Err(ApiError::Api {
                    status: reqwest::StatusCode::NOT_FOUND,
                    message: None,
                }),
            }
        }
        async fn fetch_gastos_taller(&self) -> Result<Vec<GastoTaller>, ApiError> {
            Ok(Vec::new())
        }
        async fn fetch_pagos_salarios(&self) -> Result<Vec<PagoSalario>, ApiError> {
            Ok(Vec::new())
        }
    }

    fn mecanico(id: i64, nombre: &str, activo: bool) -> Mecanico {
        Mecanico {
            id,
            id_nacional: format!("1-0000-{:04}", id),
            nombre: nombre.to_string(),
            correo: None,
            telefono: None,
            porcentaje_comision: DEFAULT_COMMISSION_RATE,
            activo,
        }
    }

    fn section_with(
        mecanicos: Vec<Mecanico>,
        estadisticas: HashMap<i64, MecanicoEstadisticas>,
        clock_time: &str,
    ) -> MechanicsSection {
        let backend = Arc::new(MockBackend {
            mecanicos,
            estadisticas,
        });
        MechanicsSection::new(backend, Arc::new(TestClock::new(clock_time)))
    }

    #[tokio::test]
    async fn preview_uses_backend_totals_when_present() {
        let mut estadisticas = HashMap::new();
        estadisticas.insert(
            1,
            MecanicoEstadisticas {
                trabajos_completados: 4,
                total_ganancias: dec!(500000),
                total_comisiones: dec!(10000),
            },
        );
        let section = section_with(
            vec![mecanico(1, "Carlos", true)],
            estadisticas,
            "2025-07-20 10:00:00",
        );
        section.refresh().await.unwrap();

        let resumen = section.comisiones_quincena();
        assert_eq!(resumen.quincena, 2);
        assert_eq!(resumen.mecanicos.len(), 1);
        assert_eq!(resumen.mecanicos[0].total_comisiones, dec!(10000));
        assert_eq!(resumen.mecanicos[0].trabajos_completados, 4);
    }

    #[tokio::test]
    async fn preview_estimates_two_percent_without_backend_totals() {
        let mut estadisticas = HashMap::new();
        estadisticas.insert(
            1,
            MecanicoEstadisticas {
                trabajos_completados: 2,
                total_ganancias: dec!(300000),
                total_comisiones: Decimal::ZERO,
            },
        );
        let section = section_with(
            vec![mecanico(1, "Carlos", true)],
            estadisticas,
            "2025-07-10 10:00:00",
        );
        section.refresh().await.unwrap();

        let resumen = section.comisiones_quincena();
        assert_eq!(resumen.quincena, 1);
        assert_eq!(resumen.mecanicos[0].total_comisiones, dec!(6000));
    }

    #[tokio::test]
    async fn inactive_mechanics_are_excluded() {
        let section = section_with(
            vec![mecanico(1, "Carlos", true), mecanico(2, "Luis", false)],
            HashMap::new(),
            "2025-07-10 10:00:00",
        );
        section.refresh().await.unwrap();

        let resumen = section.comisiones_quincena();
        assert_eq!(resumen.mecanicos.len(), 1);
        assert_eq!(resumen.mecanicos[0].nombre, "Carlos");
    }

    #[tokio::test]
    async fn missing_stats_do_not_fail_the_refresh() {
        // No stats entry for mechanic 1: the per-mechanic fetch 404s.
        let section = section_with(
            vec![mecanico(1, "Carlos", true)],
            HashMap::new(),
            "2025-07-10 10:00:00",
        );
        section.refresh().await.unwrap();

        let resumen = section.comisiones_quincena();
        assert_eq!(resumen.mecanicos.len(), 1);
        assert_eq!(resumen.mecanicos[0].total_comisiones, Decimal::ZERO);
    }
}
