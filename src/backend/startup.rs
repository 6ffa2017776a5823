use secrecy::ExposeSecret;

use crate::shared_types::BackendIdentity;
use crate::wire::observers::startup::StartupFrameObserver;
use crate::wire::utils::{be_i32, read_cstr};

use super::{ServerConnection, ServerError, ServerTarget, messages};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const AUTH_OK: i32 = 0;
const AUTH_CLEARTEXT: i32 = 3;
const AUTH_MD5: i32 = 5;

// -----------------------------------------------------------------------------
// ----- startup ---------------------------------------------------------------

/// Drive the backend handshake up to the first ReadyForQuery, collecting
/// ParameterStatus and BackendKeyData on the way.
pub(super) async fn startup(
    conn: &mut ServerConnection,
    target: &ServerTarget,
) -> Result<(), ServerError> {
    let startup = StartupFrameObserver::build(&[
        ("user", &target.user),
        ("database", &target.database),
        ("application_name", "pgharbor"),
    ]);
    conn.send(&startup).await?;

    let password = target.password.expose_secret();
    let mut sent_password = false;

    loop {
        let frame = conn.read_frame().await?;

        match frame[0] {
            b'R' => {
                if frame.len() < 9 {
                    return Err(ServerError::Protocol("authentication message too short"));
                }

                match be_i32(&frame[5..]) {
                    AUTH_OK => {}
                    AUTH_CLEARTEXT | AUTH_MD5 if sent_password => {
                        return Err(ServerError::Protocol("password requested twice"));
                    }
                    AUTH_CLEARTEXT => {
                        if password.is_empty() {
                            return Err(ServerError::MissingPassword);
                        }
                        conn.send(&messages::password(password)).await?;
                        sent_password = true;
                    }
                    AUTH_MD5 => {
                        if password.is_empty() {
                            return Err(ServerError::MissingPassword);
                        }
                        if frame.len() < 13 {
                            return Err(ServerError::Protocol("md5 request without salt"));
                        }
                        let salt = [frame[9], frame[10], frame[11], frame[12]];
                        conn.send(&messages::md5_password(&target.user, password, salt))
                            .await?;
                        sent_password = true;
                    }
                    other => return Err(ServerError::UnsupportedAuth(other)),
                }
            }
            b'S' => {
                let mut body = &frame[5..];
                if let (Ok(name), Ok(value)) = (read_cstr(&mut body), read_cstr(&mut body)) {
                    conn.parameters.push((name.to_string(), value.to_string()));
                }
            }
            b'K' => {
                if frame.len() < 13 {
                    return Err(ServerError::Protocol("BackendKeyData too short"));
                }
                conn.set_backend_key(BackendIdentity::new(
                    be_i32(&frame[5..]),
                    be_i32(&frame[9..]),
                ));
            }
            b'E' => return Err(ServerError::Rejected(error_message(&frame))),
            b'Z' => return Ok(()),
            // NoticeResponse and anything else informational.
            _ => {}
        }
    }
}

/// The 'M' field of an ErrorResponse, or a placeholder.
pub(crate) fn error_message(frame: &[u8]) -> String {
    let mut fields = &frame[5..];
    while let Some((&code, rest)) = fields.split_first() {
        if code == 0 {
            break;
        }
        fields = rest;
        let Ok(value) = read_cstr(&mut fields) else {
            break;
        };
        if code == b'M' {
            return value.to_string();
        }
    }
    "unknown error".to_string()
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
