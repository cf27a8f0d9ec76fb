/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;

use crate::{
    auth, auth::AuthResult,
    store::Store,
    user::Role,
};

#[derive(Deserialize)]
struct ConfigFile {
    auth_db_connect_string: Option<String>,
    data_db_connect_string: Option<String>,
    admin_uname: Option<String>,
    admin_password: Option<String>,
    admin_name: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    templates_dir: Option<String>,
}

#[derive(Debug)]
pub struct Cfg {
    pub auth_db_connect_string: String,
    pub data_db_connect_string: String,
    pub default_admin_uname: String,
    pub default_admin_password: String,
    pub default_admin_name: String,
    pub addr: SocketAddr,
    pub templates_dir: String,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            auth_db_connect_string: "host=localhost user=registrar password='registrar' dbname=registrar_auth".to_owned(),
            data_db_connect_string: "host=localhost user=registrar password='registrar' dbname=registrar_store".to_owned(),
            default_admin_uname: "root".to_owned(),
            default_admin_password: "toot".to_owned(),
            default_admin_name: "Default Admin".to_owned(),
            addr: SocketAddr::new(
                "0.0.0.0".parse().unwrap(),
                8001
            ),
            templates_dir: "templates/".to_owned(),
        }
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        let cf: ConfigFile = toml::from_str(&file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.auth_db_connect_string {
            c.auth_db_connect_string = s;
        }
        if let Some(s) = cf.data_db_connect_string {
            c.data_db_connect_string = s;
        }
        if let Some(s) = cf.admin_uname {
            c.default_admin_uname = s;
        }
        if let Some(s) = cf.admin_password {
            c.default_admin_password = s;
        }
        if let Some(s) = cf.admin_name {
            c.default_admin_name = s;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }
        if let Some(s) = cf.templates_dir {
            c.templates_dir = s;
        }

        Ok(c)
    }
}

/**
This guy hauls around the global variables and gets passed in an
`axum::Extension` to the handlers who need him.
*/
pub struct Glob {
    auth: Arc<RwLock<auth::Db>>,
    data: Arc<RwLock<Store>>,
    pub addr: SocketAddr,
    pub templates_dir: String,
}

impl Glob {
    pub fn auth(&self) -> Arc<RwLock<auth::Db>> { self.auth.clone() }
    pub fn data(&self) -> Arc<RwLock<Store>> { self.data.clone() }
}

/// Loads system configuration and ensures all appropriate database
/// tables exist.
///
/// Also assures existence of the default admin in both databases.
pub async fn load_configuration<P: AsRef<Path>>(path: P) -> Result<Glob, String> {
    let path = path.as_ref();
    let cfg = if path.exists() {
        Cfg::from_file(path)?
    } else {
        log::warn!(
            "Config file {} not found; using default configuration.",
            path.display()
        );
        Cfg::default()
    };
    log::info!("Configuration read:\n{:#?}", &cfg);

    log::trace!("Checking state of auth DB...");
    let auth_db = auth::Db::new(cfg.auth_db_connect_string.clone());
    if let Err(e) = auth_db.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of auth DB: {}", &e.display());
        return Err(estr);
    }
    log::trace!("...auth DB okay.");

    log::trace!("Checking state of data DB...");
    let data_db = Store::new(cfg.data_db_connect_string.clone());
    if let Err(e) = data_db.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of data DB: {}", &e.display());
        return Err(estr);
    }
    log::trace!("...data DB okay.");

    log::trace!("Checking existence of default Admin in data DB...");
    let default_admin = match data_db.get_user_by_uname(
        &cfg.default_admin_uname
    ).await {
        Err(e) => {
            let estr = format!(
                "Error attempting to check existence of default Admin ({}) in data DB: {}",
                &cfg.default_admin_uname, &e.display()
            );
            return Err(estr);
        },
        Ok(None) => {
            log::info!(
                "Default Admin ({}) doesn't exist in data DB; inserting.",
                &cfg.default_admin_uname
            );
            match data_db.insert_user(
                &cfg.default_admin_uname,
                Role::Admin,
                &cfg.default_admin_name
            ).await {
                Err(e) => {
                    let estr = format!(
                        "Error inserting default Admin into data DB: {}",
                        &e.display()
                    );
                    return Err(estr);
                },
                Ok(None) => {
                    let estr = "Default Admin uname claimed by a concurrent insert.".to_owned();
                    return Err(estr);
                },
                Ok(Some(u)) => u,
            }
        },
        Ok(Some(u)) => u,
    };
    log::trace!("Default Admin OK in data DB.");

    log::trace!("Checking existence of default Admin in auth DB...");
    match auth_db.check_password(
        &default_admin.uname,
        &cfg.default_admin_password,
        &default_admin.salt,
    ).await {
        Err(e) => {
            let estr = format!(
                "Error checking existence of default Admin in auth DB: {}",
                &e.display()
            );
            return Err(estr);
        },
        Ok(AuthResult::BadPassword) => {
            log::warn!(
                "Default Admin ({}) not using default password.",
                &default_admin.uname
            );
        },
        Ok(AuthResult::NoSuchUser) => {
            log::info!(
                "Default Admin ({}) doesn't exist in auth DB; inserting.",
                &default_admin.uname
            );
            if let Err(e) = auth_db.add_user(
                &default_admin.uname,
                &cfg.default_admin_password,
                &default_admin.salt
            ).await {
                let estr = format!(
                    "Error inserting default Admin into auth DB: {}",
                    &e.display()
                );
                return Err(estr);
            };
            log::trace!("Default Admin inserted into auth DB.");
        },
        Ok(AuthResult::Ok) => {
            log::trace!("Default Admin password check OK.");
        },
        Ok(x) => {
            let estr = format!(
                "Default Admin password check resulted in {:?}, which just doesn't make sense.",
                &x
            );
            return Err(estr);
        },
    }
    log::trace!("Default Admin OK in auth DB.");

    let glob = Glob {
        auth: Arc::new(RwLock::new(auth_db)),
        data: Arc::new(RwLock::new(data_db)),
        addr: cfg.addr,
        templates_dir: cfg.templates_dir,
    };

    Ok(glob)
}
