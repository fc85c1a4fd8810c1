use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "resources/"]
pub struct Assets;

/// Read an embedded text asset, if it exists and is valid UTF-8.
pub fn text(name: &str) -> Option<String> {
    Assets::get(name).and_then(|f| String::from_utf8(f.data.into_owned()).ok())
}
