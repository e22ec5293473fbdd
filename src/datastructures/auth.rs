use serde_json::{json, Value};

/// Where the one-time login code is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationChannel {
    Sms,
    Email,
}

impl VerificationChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationChannel::Sms => "MOBILE",
            VerificationChannel::Email => "EMAIL",
        }
    }
}

/// Progress through the multi-factor login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    TicketRequested,
    Authenticated,
}

/// Payload asking the server to deliver a one-time code.
pub fn verification_code_payload(
    channel: VerificationChannel,
    username: &str,
    area_code_id: &str,
    captcha_answer: Option<&str>,
) -> Value {
    let mut data = match channel {
        VerificationChannel::Email => json!({
            "email": username,
            "type": "EMAIL",
            "updateType": "EMAIL",
            "verifyType": "LOGIN",
        }),
        VerificationChannel::Sms => json!({
            "mobile": username,
            "type": "MOBILE",
            "updateType": "MOBILE",
            "verifyType": "LOGIN",
            "areaCodeId": area_code_id,
        }),
    };
    if let Some(answer) = captcha_answer {
        data["captchaInputText"] = json!(answer);
    }
    data
}

/// Credentials exchange. Without a code this is the first factor; with one it completes the second.
pub fn login_ticket_payload(
    channel: VerificationChannel,
    username: &str,
    password: &str,
    area_code_id: &str,
    code: Option<&str>,
) -> Value {
    let mut data = json!({
        "password": password,
        "type": channel.as_str(),
        "userName": username,
    });
    if channel == VerificationChannel::Sms {
        data["areaCodeId"] = json!(area_code_id);
    }
    if let Some(code) = code {
        data["smsInputText"] = json!(code);
    }
    data
}
