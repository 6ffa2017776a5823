/// Handshake stage of a client connection.
///
/// Frame peeking depends on it: before authentication completes the client
/// speaks untagged startup packets and password messages, afterwards only
/// tagged frontend messages are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    /// Waiting for StartupMessage, SSLRequest, GSSENCRequest or CancelRequest.
    Startup,

    /// Cleartext password requested, waiting for the PasswordMessage.
    Authenticating,

    /// Handshake finished; the client is bound to a pool or the admin channel.
    Ready,
}
