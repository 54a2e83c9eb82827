use super::{payload::normalize, Subscribers};
use log::{debug, error, warn};
use serde_json::Value;
use std::io::Read;
use tiny_http::{Request, Response, Server};

/// Answer the incoming requests until the server is closed.
pub(super) fn serve(server: Server, subscribers: Subscribers) {
    for request in server.incoming_requests() {
        debug!("Received request on {} {}.", request.method(), request.url());
        handle(request, &subscribers);
    }
}

fn header(request: &Request, name: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|header| header.field.equiv(name))
        .map(|header| header.value.as_str().to_string())
}

/// Form encoded webhooks send the JSON in the `payload` field.
fn json_body(body: &str, content_type: Option<&str>) -> Result<String, String> {
    let is_form = content_type.is_some_and(|content_type| {
        content_type.starts_with("application/x-www-form-urlencoded")
    });
    if !is_form {
        return Ok(body.to_string());
    }

    form_urlencoded::parse(body.as_bytes())
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| String::from("missing payload field"))
}

fn handle(mut request: Request, subscribers: &Subscribers) {
    let (status, message) = match header(&request, "X-GitHub-Event").as_deref() {
        Some(event) if event != "push" => {
            debug!("Ignoring {event} event.");
            (200, String::from("OK"))
        }
        _ => {
            let mut body = String::new();
            match request.as_reader().read_to_string(&mut body) {
                Ok(_) => match json_body(&body, header(&request, "Content-Type").as_deref()) {
                    Ok(json) => receive(&json, subscribers),
                    Err(err) => (400, err),
                },
                Err(err) => (400, format!("cannot read body: {err}")),
            }
        }
    };

    if status != 200 {
        warn!("Rejected request: {message}.");
    }
    if let Err(err) = request.respond(Response::from_string(message).with_status_code(status)) {
        error!("Cannot respond to the request: {err}.");
    }
}

fn receive(body: &str, subscribers: &Subscribers) -> (u16, String) {
    let json: Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(err) => return (400, format!("invalid json: {err}")),
    };

    match normalize(&json) {
        Ok(Some(notification)) => {
            let delivered = subscribers.dispatch(&notification);
            debug!(
                "Delivered push on {} to {delivered} subscriptions.",
                notification.branch_name
            );
            (200, String::from("OK"))
        }
        Ok(None) => {
            debug!("Ignoring push event that cannot be deployed.");
            (200, String::from("OK"))
        }
        Err(err) => (400, err.to_string()),
    }
}
