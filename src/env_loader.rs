use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(noaa_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    match noaa_home {
        Some(home) => Some(home.join(".env")),
        None => Some(home_dir?.join("noaa-index").join(".env")),
    }
}

/// Loads `.env` from the working directory, else from the index home.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("NOAA_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}
