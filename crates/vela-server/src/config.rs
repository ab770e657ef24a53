//! Environment-driven server configuration.

use std::env;

use vela_auth::AuthConfig;
use vela_db::DbConfig;

/// Everything the server binary needs to come up.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub auth: AuthConfig,
}

impl ServerConfig {
    /// Read configuration from the environment, falling back to the
    /// library defaults for anything unset. JWT keys have no default:
    /// the process refuses to start without signing material.
    pub fn from_env() -> Result<Self, String> {
        let mut db = DbConfig::default();
        if let Ok(url) = env::var("VELA_DB_URL") {
            db.url = url;
        }
        if let Ok(namespace) = env::var("VELA_DB_NAMESPACE") {
            db.namespace = namespace;
        }
        if let Ok(database) = env::var("VELA_DB_NAME") {
            db.database = database;
        }
        if let Ok(username) = env::var("VELA_DB_USER") {
            db.username = username;
        }
        if let Ok(password) = env::var("VELA_DB_PASSWORD") {
            db.password = password;
        }

        let mut auth = AuthConfig {
            jwt_private_key_pem: env::var("VELA_JWT_PRIVATE_KEY_PEM")
                .map_err(|_| "VELA_JWT_PRIVATE_KEY_PEM is required".to_string())?,
            jwt_public_key_pem: env::var("VELA_JWT_PUBLIC_KEY_PEM")
                .map_err(|_| "VELA_JWT_PUBLIC_KEY_PEM is required".to_string())?,
            ..AuthConfig::default()
        };
        if let Ok(issuer) = env::var("VELA_JWT_ISSUER") {
            auth.jwt_issuer = issuer;
        }
        if let Ok(pepper) = env::var("VELA_PASSWORD_PEPPER") {
            auth.pepper = Some(pepper);
        }

        Ok(Self { db, auth })
    }
}
