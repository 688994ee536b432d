use actix_web::{HttpRequest, HttpResponse, http::header::HeaderMap, web};
use anyhow::Context;
use secrecy::ExposeSecret;

use super::{
    errors::WebhookError,
    types::{Command, Update},
};
use crate::{
    configuration::TemplateSettings,
    domain::RecipientId,
    registry_client::{RegistryClient, Removal},
    startup::WebhookSecret,
    telegram_client::TelegramClient,
};

const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Receives bot updates. Always answers 200 once authenticated so Telegram
/// does not redeliver; failures are reported to the user in the reply.
#[tracing::instrument(
    name = "Handling a Telegram update",
    skip_all,
    fields(chat_id = tracing::field::Empty, command = tracing::field::Empty)
)]
pub async fn telegram_webhook(
    request: HttpRequest,
    body: web::Bytes,
    registry: web::Data<RegistryClient>,
    telegram: web::Data<TelegramClient>,
    templates: web::Data<TemplateSettings>,
    secret: web::Data<WebhookSecret>,
) -> Result<HttpResponse, WebhookError> {
    verify_secret(request.headers(), &secret).map_err(WebhookError::AuthError)?;
    let update: Update = serde_json::from_slice(&body).map_err(WebhookError::InvalidUpdate)?;

    let Some((chat_id, command)) = update.command() else {
        return Ok(HttpResponse::Ok().finish());
    };
    tracing::Span::current().record("chat_id", tracing::field::display(&chat_id));
    tracing::Span::current().record("command", command.as_str());

    let reply = match command {
        Command::Start => templates.welcome.as_str(),
        Command::SetReminder => set_reminder(&registry, chat_id, &templates).await,
        Command::UnsetReminder => unset_reminder(&registry, chat_id, &templates).await,
    };

    if let Err(e) = telegram.send_text(chat_id, reply).await {
        tracing::warn!(
            error.cause_chain = ?e,
            error.message = %e,
            "Failed to send the command reply"
        );
    }

    Ok(HttpResponse::Ok().finish())
}

fn verify_secret(headers: &HeaderMap, expected: &WebhookSecret) -> Result<(), anyhow::Error> {
    let provided = headers
        .get(SECRET_HEADER)
        .context("The secret token header is missing.")?
        .to_str()
        .context("The secret token header was not a valid UTF8 string.")?;

    if provided != expected.0.expose_secret() {
        anyhow::bail!("The secret token does not match.");
    }
    Ok(())
}

async fn set_reminder<'a>(
    registry: &RegistryClient,
    chat_id: RecipientId,
    templates: &'a TemplateSettings,
) -> &'a str {
    let outcome = match registry.get_subscriber(chat_id).await {
        Ok(Some(_)) => Ok(templates.already_registered.as_str()),
        Ok(None) => registry
            .register_subscriber(chat_id)
            .await
            .map(|()| templates.registered.as_str()),
        Err(e) => Err(e),
    };

    outcome.unwrap_or_else(|e| {
        tracing::error!(
            error.cause_chain = ?e,
            error.message = %e,
            "Failed to register the subscriber"
        );
        templates.request_failed.as_str()
    })
}

async fn unset_reminder<'a>(
    registry: &RegistryClient,
    chat_id: RecipientId,
    templates: &'a TemplateSettings,
) -> &'a str {
    match registry.remove_subscriber(chat_id).await {
        Ok(Removal::Removed) => templates.unregistered.as_str(),
        Ok(Removal::AlreadyAbsent) => templates.not_registered.as_str(),
        Err(e) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "Failed to remove the subscriber"
            );
            templates.request_failed.as_str()
        }
    }
}
