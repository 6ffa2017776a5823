pub(crate) mod admin;
pub(crate) mod authenticating;
pub(crate) mod startup;

pub(crate) use authenticating::handle_authenticating;
pub(crate) use startup::handle_startup;
