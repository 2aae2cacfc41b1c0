use std::path::Path;

use super::error::PgError;
use super::probe::HbaRule;

const POSTGRES_PAGE_SIZE: u64 = 8192;

/// Refuse to synthesize a config with `full_page_writes=off` unless the
/// destination dataset's `recordsize` is at least a PostgreSQL page.
/// `full_page_writes=off` is only safe when the filesystem itself
/// guarantees torn-write protection at the page granularity; ZFS does, but
/// only if writes aren't being split below the page size.
pub fn assert_recordsize_safe(recordsize: u64) -> Result<(), PgError> {
    if recordsize < POSTGRES_PAGE_SIZE {
        return Err(PgError::UnsafeRecordsize { actual: recordsize });
    }
    Ok(())
}

pub struct ConfigParams<'a> {
    pub port: u16,
    pub log_directory: &'a Path,
    pub log_filename: &'a str,
}

/// Render `postgresql.conf` for a branch's data directory. The knob set is
/// fixed; the only things that vary between `main` and a branch clone are
/// port and the two log path settings, which is also all an in-place branch
/// rewrite (see [`rewrite_setting`]) ever needs to touch.
pub fn render_postgresql_conf(params: &ConfigParams) -> String {
    format!(
        "port = {port}\n\
         listen_addresses = '*'\n\
         unix_socket_directories = '/var/run/postbranch'\n\
         max_connections = 20\n\
         full_page_writes = off\n\
         password_encryption = 'scram-sha-256'\n\
         log_directory = '{log_directory}'\n\
         log_filename = '{log_filename}'\n\
         logging_collector = on\n\
         log_rotation_size = 10MB\n\
         log_file_mode = 0600\n\
         log_checkpoints = on\n",
        port = params.port,
        log_directory = params.log_directory.display(),
        log_filename = params.log_filename,
    )
}

pub fn render_pg_hba_conf(rules: &[HbaRule]) -> String {
    let mut out = String::new();
    for rule in rules {
        out.push_str(&format!(
            "{type} {database} {user} {address} {auth}\n",
            type = rule.rule_type,
            database = rule.database,
            user = rule.user_name,
            address = match (&rule.address, &rule.netmask) {
                (Some(a), Some(m)) => format!("{a} {m}"),
                (Some(a), None) => a.clone(),
                _ => String::new(),
            },
            auth = rule.auth_method,
        ));
    }
    out
}

/// Rewrite a single `key = value` line in `path`, matched by key prefix,
/// leaving every other line untouched. Used after a base backup or branch
/// clone to retarget `port`, `log_filename`, and `log_directory` without
/// regenerating the whole file.
pub fn rewrite_setting(path: &Path, key: &str, value: &str) -> Result<(), PgError> {
    let contents = std::fs::read_to_string(path)?;
    let prefix = format!("{key} ");
    let rewritten: String = contents
        .lines()
        .map(|line| if line.starts_with(&prefix) { format!("{key} = {value}") } else { line.to_string() })
        .collect::<Vec<_>>()
        .join("\n");
    std::fs::write(path, rewritten + "\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recordsize_below_page_size_is_rejected() {
        assert!(matches!(assert_recordsize_safe(4096), Err(PgError::UnsafeRecordsize { actual: 4096 })));
    }

    #[test]
    fn recordsize_at_or_above_page_size_is_accepted() {
        assert!(assert_recordsize_safe(8192).is_ok());
        assert!(assert_recordsize_safe(16384).is_ok());
    }

    #[test]
    fn rendered_conf_contains_fixed_knobs() {
        let params = ConfigParams {
            port: 5450,
            log_directory: Path::new("/mnt/pb-acme/main/logs"),
            log_filename: "acme_main__%Y-%m-%d_%H-%M-%S.log",
        };
        let conf = render_postgresql_conf(&params);
        assert!(conf.contains("port = 5450"));
        assert!(conf.contains("full_page_writes = off"));
        assert!(conf.contains("log_rotation_size = 10MB"));
    }

    #[test]
    fn rewrite_setting_changes_only_the_matching_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postgresql.conf");
        std::fs::write(&path, "port = 5450\nmax_connections = 20\n").unwrap();
        rewrite_setting(&path, "port", "5451").unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("port = 5451"));
        assert!(contents.contains("max_connections = 20"));
    }
}
