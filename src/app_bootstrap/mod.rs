pub(crate) mod services;
