// src/api_client.rs
//
// Typed client for the Auto Andrade backend API. The backend owns all
// business rules (tax, commission math, relational integrity); this client
// only reads the slices the dashboard sections display.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("URL parsing failed: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Backend API returned an error: {status} - {message:?}")]
    Api {
        status: reqwest::StatusCode,
        message: Option<String>,
    },
}

/// Configuration for the backend client.
#[derive(Clone, Debug)]
pub struct AndradeConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for AndradeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

// --- Backend Models ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetalleGasto {
    pub descripcion: String,
    pub monto: Decimal,
}

/// Work order row as returned by `GET /trabajos/`. Money fields are computed
/// by the backend; the dashboard only aggregates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trabajo {
    pub id: i64,
    pub matricula_carro: String,
    pub descripcion: String,
    pub fecha: NaiveDate,
    pub costo: Decimal,
    #[serde(default)]
    pub ganancia: Decimal,
    #[serde(default = "default_aplica_iva")]
    pub aplica_iva: bool,
    #[serde(default)]
    pub cliente_nombre: Option<String>,
    #[serde(default)]
    pub total_gastos: Decimal,
    #[serde(default)]
    pub detalle_gastos: Vec<DetalleGasto>,
}

fn default_aplica_iva() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mecanico {
    pub id: i64,
    pub id_nacional: String,
    pub nombre: String,
    #[serde(default)]
    pub correo: Option<String>,
    #[serde(default)]
    pub telefono: Option<String>,
    /// Commission percentage, 2% unless overridden per mechanic.
    pub porcentaje_comision: Decimal,
    #[serde(default = "default_activo")]
    pub activo: bool,
}

fn default_activo() -> bool {
    true
}

/// Per-mechanic totals from `GET /mecanicos/{id}/estadisticas`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MecanicoEstadisticas {
    #[serde(default)]
    pub trabajos_completados: i64,
    #[serde(default)]
    pub total_ganancias: Decimal,
    #[serde(default)]
    pub total_comisiones: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GastoTaller {
    pub id: i64,
    pub descripcion: String,
    pub monto: Decimal,
    pub categoria: String,
    pub fecha_gasto: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagoSalario {
    pub id: i64,
    pub id_mecanico: i64,
    pub monto_salario: Decimal,
    pub semana_pago: String,
    pub fecha_pago: NaiveDate,
    #[serde(default)]
    pub nombre_mecanico: Option<String>,
}

// --- Client ---

/// Read surface the dashboard sections depend on. Seam for tests; the real
/// implementation is `AndradeClient`.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn fetch_trabajos(&self) -> Result<Vec<Trabajo>, ApiError>;
    async fn fetch_mecanicos(&self) -> Result<Vec<Mecanico>, ApiError>;
    async fn fetch_estadisticas_mecanico(&self, id: i64)
        -> Result<MecanicoEstadisticas, ApiError>;
    async fn fetch_gastos_taller(&self) -> Result<Vec<GastoTaller>, ApiError>;
    async fn fetch_pagos_salarios(&self) -> Result<Vec<PagoSalario>, ApiError>;
}

pub struct AndradeClient {
    http_client: Client,
    config: AndradeConfig,
}

impl AndradeClient {
    pub fn new(config: AndradeConfig) -> Result<Self, ApiError> {
        // Reject a malformed base URL at startup rather than on first fetch.
        Url::parse(&config.base_url)?;
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        let joined = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        Ok(Url::parse(&joined)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);
        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.ok();
            return Err(ApiError::Api { status, message });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl BackendApi for AndradeClient {
    async fn fetch_trabajos(&self) -> Result<Vec<Trabajo>, ApiError> {
        self.get_json("/trabajos/").await
    }

    async fn fetch_mecanicos(&self) -> Result<Vec<Mecanico>, ApiError> {
        self.get_json("/mecanicos/").await
    }

    async fn fetch_estadisticas_mecanico(
        &self,
        id: i64,
    ) -> Result<MecanicoEstadisticas, ApiError> {
        self.get_json(&format!("/mecanicos/{}/estadisticas", id)).await
    }

    async fn fetch_gastos_taller(&self) -> Result<Vec<GastoTaller>, ApiError> {
        self.get_json("/gastos-taller/").await
    }

    async fn fetch_pagos_salarios(&self) -> Result<Vec<PagoSalario>, ApiError> {
        self.get_json("/pagos-salarios/").await
    }
}
