use std::net::TcpListener;

use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
use anyhow::Context;
use secrecy::SecretString;
use tracing_actix_web::TracingLogger;

use crate::configuration::{Settings, TemplateSettings};
use crate::registry_client::RegistryClient;
use crate::routes::{health_check, telegram_webhook};
use crate::telegram_client::TelegramClient;

pub struct Application {
    port: u16,
    server: Server,
}

/// Shared secret Telegram sends with every webhook call.
pub struct WebhookSecret(pub SecretString);

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let registry = config
            .registry
            .command_client()
            .context("Failed to build the registry client")?;
        let telegram = config
            .telegram
            .client()
            .context("Failed to build the Telegram client")?;

        let address = format!("{}:{}", config.app.host, config.app.port);
        let listener =
            TcpListener::bind(&address).with_context(|| format!("Failed to bind {address}"))?;
        let port = listener.local_addr()?.port();
        let server = run(
            listener,
            registry,
            telegram,
            config.broadcast.templates,
            config.telegram.webhook_secret,
        )?;

        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn run(
    listener: TcpListener,
    registry: RegistryClient,
    telegram: TelegramClient,
    templates: TemplateSettings,
    webhook_secret: SecretString,
) -> Result<Server, anyhow::Error> {
    let registry = web::Data::new(registry);
    let telegram = web::Data::new(telegram);
    let templates = web::Data::new(templates);
    let webhook_secret = web::Data::new(WebhookSecret(webhook_secret));

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .route("/telegram/webhook", web::post().to(telegram_webhook))
            .app_data(registry.clone())
            .app_data(telegram.clone())
            .app_data(templates.clone())
            .app_data(webhook_secret.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
