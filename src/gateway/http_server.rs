use super::http_errors::json_error_handler;
use super::routes::{configure, GatewayState};
use crate::error::StagerResult;
use actix_web::{web, App, HttpServer as ActixHttpServer};
use log::info;

/// HTTP server for the internal staging endpoints.
pub struct StagerHttpServer {
    state: web::Data<GatewayState>,
    bind_address: String,
}

impl StagerHttpServer {
    pub fn new(state: GatewayState, bind_address: &str) -> Self {
        Self {
            state: web::Data::new(state),
            bind_address: bind_address.to_string(),
        }
    }

    /// Serve until the server is stopped.
    pub async fn run(&self) -> StagerResult<()> {
        info!("Staging callback server running on {}", self.bind_address);
        let state = self.state.clone();
        ActixHttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .app_data(web::JsonConfig::default().error_handler(json_error_handler))
                .configure(configure)
        })
        .bind(&self.bind_address)?
        .run()
        .await?;
        Ok(())
    }
}
