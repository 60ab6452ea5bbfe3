//! Asset fetching.
//!
//! In the browser, paths resolve against `<page>/res/` and are fetched over
//! HTTP. On desktop, paths resolve against the `res/` directory copied into
//! `OUT_DIR` by the build script, falling back to the path as given so that
//! arbitrary files on disk can be opened too.

use anyhow::Context;

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().context("no window object available")?;
    let href = window
        .location()
        .href()
        .map_err(|e| anyhow::anyhow!("unable to read page location: {:?}", e))?;
    let base = reqwest::Url::parse(&href)?.join("res/")?;
    Ok(base.join(file_name)?)
}

#[cfg(not(target_arch = "wasm32"))]
fn resolve_path(file_name: &str) -> std::path::PathBuf {
    let bundled = std::path::Path::new(env!("OUT_DIR"))
        .join("res")
        .join(file_name);
    if bundled.exists() {
        bundled
    } else {
        std::path::PathBuf::from(file_name)
    }
}

pub async fn load_string(file_name: &str) -> anyhow::Result<String> {
    #[cfg(target_arch = "wasm32")]
    let txt = {
        let url = format_url(file_name)?;
        reqwest::get(url)
            .await?
            .error_for_status()?
            .text()
            .await?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let txt = {
        let path = resolve_path(file_name);
        std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?
    };

    Ok(txt)
}

pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(file_name)?;
        reqwest::get(url)
            .await?
            .error_for_status()?
            .bytes()
            .await?
            .to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        let path = resolve_path(file_name);
        std::fs::read(&path).with_context(|| format!("read {}", path.display()))?
    };

    Ok(data)
}
