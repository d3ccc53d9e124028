use crate::Error;
use std::any::Any;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Creates and releases renderer-side textures for atlas pages. The atlas
/// never allocates or frees textures itself; it only forwards these calls.
pub trait TextureLoader {
    /// Creates the texture for `page` and stores it in
    /// [`AtlasPage::renderer_object`]. `path` is the images directory joined
    /// with the page file name.
    fn load(
        &mut self,
        page: &mut AtlasPage,
        path: &Path,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Releases a texture previously stored by [`TextureLoader::load`].
    fn unload(&mut self, texture: Box<dyn Any + Send + Sync>);
}

/// Parsed atlas: pages and regions in file order, plus the loader used to
/// release textures on [`Atlas::dispose`].
pub struct Atlas {
    pub pages: Vec<AtlasPage>,
    pub regions: Vec<AtlasRegion>,
    loader: Option<Box<dyn TextureLoader>>,
}

impl std::fmt::Debug for Atlas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atlas")
            .field("pages", &self.pages)
            .field("regions", &self.regions)
            .finish_non_exhaustive()
    }
}

impl Atlas {
    /// Parses an atlas description without loading textures.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let (pages, regions) = parse_atlas(input, None)?;
        Ok(Atlas {
            pages,
            regions,
            loader: None,
        })
    }

    /// Parses an atlas description, loading each page's texture through
    /// `loader` as the page finishes parsing. The loader is retained so
    /// [`Atlas::dispose`] can release the textures again.
    pub fn parse_with_loader(
        input: &str,
        images_dir: &Path,
        mut loader: Box<dyn TextureLoader>,
    ) -> Result<Self, Error> {
        let (pages, regions) = parse_atlas(input, Some((images_dir, loader.as_mut())))?;
        Ok(Atlas {
            pages,
            regions,
            loader: Some(loader),
        })
    }

    /// Builds an atlas from already-constructed pages and regions. No loader
    /// is attached, so [`Atlas::dispose`] is a no-op.
    pub fn from_parts(pages: Vec<AtlasPage>, regions: Vec<AtlasRegion>) -> Self {
        Atlas {
            pages,
            regions,
            loader: None,
        }
    }

    /// Returns the first region with the given name, in file order.
    ///
    /// Lookup is an uncached linear scan by string comparison; callers doing
    /// repeated lookups should cache the result. Duplicate names are legal
    /// (animation frames) and disambiguated only by [`AtlasRegion::index`] if
    /// the caller chooses to use it.
    pub fn find_region(&self, name: &str) -> Option<&AtlasRegion> {
        self.regions.iter().find(|region| region.name == name)
    }

    pub fn page(&self, index: usize) -> Option<&AtlasPage> {
        self.pages.get(index)
    }

    /// Flips every region's V coordinates, for renderers whose texture origin
    /// is on the opposite edge from the packer's. Applying it twice restores
    /// the original values.
    pub fn flip_v(&mut self) {
        for region in &mut self.regions {
            region.v = 1.0 - region.v;
            region.v2 = 1.0 - region.v2;
        }
    }

    /// Releases every page's renderer handle through the loader this atlas
    /// was parsed with. Must be called before the atlas is discarded or the
    /// renderer-side textures leak. A no-op when no loader is attached.
    pub fn dispose(&mut self) {
        let Some(loader) = self.loader.as_mut() else {
            return;
        };
        for page in &mut self.pages {
            if let Some(texture) = page.renderer_object.take() {
                loader.unload(texture);
            }
        }
    }
}

impl FromStr for Atlas {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Format {
    Alpha,
    Intensity,
    LuminanceAlpha,
    RGB565,
    RGBA4444,
    RGB888,
    #[default]
    RGBA8888,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum TextureFilter {
    #[default]
    Nearest,
    Linear,
    MipMap,
    MipMapNearestNearest,
    MipMapLinearNearest,
    MipMapNearestLinear,
    MipMapLinearLinear,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum TextureWrap {
    MirroredRepeat,
    #[default]
    ClampToEdge,
    Repeat,
}

/// One packed texture sheet plus its sampling/format metadata.
pub struct AtlasPage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap_u: TextureWrap,
    pub wrap_v: TextureWrap,
    pub pma: bool,
    /// Renderer-side texture handle, owned by the external [`TextureLoader`].
    pub renderer_object: Option<Box<dyn Any + Send + Sync>>,
}

impl AtlasPage {
    pub fn new(name: impl Into<String>) -> Self {
        AtlasPage {
            name: name.into(),
            width: 0,
            height: 0,
            format: Format::default(),
            min_filter: TextureFilter::default(),
            mag_filter: TextureFilter::default(),
            wrap_u: TextureWrap::default(),
            wrap_v: TextureWrap::default(),
            pma: false,
            renderer_object: None,
        }
    }
}

impl fmt::Debug for AtlasPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtlasPage")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("min_filter", &self.min_filter)
            .field("mag_filter", &self.mag_filter)
            .field("wrap_u", &self.wrap_u)
            .field("wrap_v", &self.wrap_v)
            .field("pma", &self.pma)
            .field("renderer_object", &self.renderer_object.is_some())
            .finish()
    }
}

/// One named sub-rectangle of a page, plus packing metadata.
///
/// `width`/`height` always describe the unrotated visual footprint: for
/// regions packed with 90 degrees of rotation they are swapped after the UV
/// rect has been computed against the on-texture footprint.
#[derive(Clone, Debug)]
pub struct AtlasRegion {
    pub name: String,
    /// Index of the owning page in [`Atlas::pages`].
    pub page: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Displacement of the packed (cropped) rect from the original rect's origin.
    pub offset_x: i32,
    pub offset_y: i32,
    pub original_width: u32,
    pub original_height: u32,
    /// Packing rotation in degrees, as written in the file. Only 90 affects
    /// geometry resolution.
    pub degrees: i32,
    /// Packing index, for ordering among duplicate names.
    pub index: i32,
    pub u: f32,
    pub v: f32,
    pub u2: f32,
    pub v2: f32,
    /// Keys of custom fields not recognized by the built-in schema, parallel
    /// to `values`. Empty when the region had none.
    pub names: Vec<String>,
    pub values: Vec<Vec<i32>>,
}

impl AtlasRegion {
    fn new(name: impl Into<String>, page: usize) -> Self {
        AtlasRegion {
            name: name.into(),
            page,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            offset_x: 0,
            offset_y: 0,
            original_width: 0,
            original_height: 0,
            degrees: 0,
            index: 0,
            u: 0.0,
            v: 0.0,
            u2: 0.0,
            v2: 0.0,
            names: Vec::new(),
            values: Vec::new(),
        }
    }
}

/// One tokenized `key: v1,v2,v3,v4` line. At most 4 values are kept.
struct Entry<'a> {
    key: &'a str,
    values: [&'a str; 4],
    count: usize,
}

impl<'a> Entry<'a> {
    fn value(&self, index: usize) -> &'a str {
        if index < self.count { self.values[index] } else { "" }
    }
}

/// Splits a line at its first colon into a trimmed key and up to 4 trimmed
/// comma-separated values; a 5th or later value is silently dropped. Empty
/// and colon-less lines yield no entry, ending the enclosing block.
fn read_entry(line: &str) -> Option<Entry<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (key, rest) = line.split_once(':')?;
    let mut entry = Entry {
        key: key.trim(),
        values: [""; 4],
        count: 0,
    };
    for (i, token) in rest.split(',').take(4).enumerate() {
        entry.values[i] = token.trim();
        entry.count = i + 1;
    }
    Some(entry)
}

// Unknown keys and malformed values are tolerated by design: the format has
// no version marker, so forward/backward schema drift must parse.
fn parse_u32(value: &str) -> u32 {
    value.parse().unwrap_or(0)
}

fn parse_i32(value: &str) -> i32 {
    value.parse().unwrap_or(0)
}

fn parse_degrees(value: &str) -> i32 {
    match value {
        "true" => 90,
        "false" => 0,
        _ => value.parse().unwrap_or(0),
    }
}

fn parse_format(value: &str) -> Option<Format> {
    match value {
        "Alpha" => Some(Format::Alpha),
        "Intensity" => Some(Format::Intensity),
        "LuminanceAlpha" => Some(Format::LuminanceAlpha),
        "RGB565" => Some(Format::RGB565),
        "RGBA4444" => Some(Format::RGBA4444),
        "RGB888" => Some(Format::RGB888),
        "RGBA8888" => Some(Format::RGBA8888),
        _ => None,
    }
}

fn parse_filter(value: &str) -> Option<TextureFilter> {
    match value {
        "Nearest" => Some(TextureFilter::Nearest),
        "Linear" => Some(TextureFilter::Linear),
        "MipMap" => Some(TextureFilter::MipMap),
        "MipMapNearestNearest" => Some(TextureFilter::MipMapNearestNearest),
        "MipMapLinearNearest" => Some(TextureFilter::MipMapLinearNearest),
        "MipMapNearestLinear" => Some(TextureFilter::MipMapNearestLinear),
        "MipMapLinearLinear" => Some(TextureFilter::MipMapLinearLinear),
        _ => None,
    }
}

fn apply_page_field(page: &mut AtlasPage, entry: &Entry<'_>) {
    match entry.key {
        "size" => {
            page.width = parse_u32(entry.value(0));
            page.height = parse_u32(entry.value(1));
        }
        "format" => {
            if let Some(format) = parse_format(entry.value(0)) {
                page.format = format;
            }
        }
        "filter" => {
            if let Some(filter) = parse_filter(entry.value(0)) {
                page.min_filter = filter;
            }
            if let Some(filter) = parse_filter(entry.value(1)) {
                page.mag_filter = filter;
            }
        }
        "repeat" => {
            // `x` and `y` are checked independently; `xy` enables both.
            let value = entry.value(0);
            if value.contains('x') {
                page.wrap_u = TextureWrap::Repeat;
            }
            if value.contains('y') {
                page.wrap_v = TextureWrap::Repeat;
            }
        }
        "pma" => page.pma = entry.value(0) == "true",
        _ => {}
    }
}

fn apply_region_field(region: &mut AtlasRegion, entry: &Entry<'_>) {
    match entry.key {
        // `xy`/`size` and `offset`/`orig` are the legacy two-value forms of
        // `bounds` and `offsets`.
        "xy" => {
            region.x = parse_u32(entry.value(0));
            region.y = parse_u32(entry.value(1));
        }
        "size" => {
            region.width = parse_u32(entry.value(0));
            region.height = parse_u32(entry.value(1));
        }
        "bounds" => {
            region.x = parse_u32(entry.value(0));
            region.y = parse_u32(entry.value(1));
            region.width = parse_u32(entry.value(2));
            region.height = parse_u32(entry.value(3));
        }
        "offset" => {
            region.offset_x = parse_i32(entry.value(0));
            region.offset_y = parse_i32(entry.value(1));
        }
        "orig" => {
            region.original_width = parse_u32(entry.value(0));
            region.original_height = parse_u32(entry.value(1));
        }
        "offsets" => {
            region.offset_x = parse_i32(entry.value(0));
            region.offset_y = parse_i32(entry.value(1));
            region.original_width = parse_u32(entry.value(2));
            region.original_height = parse_u32(entry.value(3));
        }
        "rotate" => region.degrees = parse_degrees(entry.value(0)),
        "index" => region.index = parse_i32(entry.value(0)),
        key => {
            // Custom metadata: keep the key and best-effort integer values.
            region.names.push(key.to_string());
            region
                .values
                .push((0..entry.count).map(|i| parse_i32(entry.value(i))).collect());
        }
    }
}

/// Finalizes a region when its block closes: defaults the original size,
/// computes the normalized UV rect against the on-texture footprint, then
/// swaps the stored packed size for 90-degree rotated regions so callers
/// always see the unrotated visual footprint.
fn resolve_region_geometry(region: &mut AtlasRegion, page: &AtlasPage) -> Result<(), Error> {
    if region.original_width == 0 && region.original_height == 0 {
        region.original_width = region.width;
        region.original_height = region.height;
    }

    if page.width == 0 || page.height == 0 {
        return Err(Error::AtlasParse {
            message: format!(
                "page '{}' has zero size, cannot compute UVs for region '{}'",
                page.name, region.name
            ),
        });
    }
    let page_width = page.width as f32;
    let page_height = page.height as f32;

    region.u = region.x as f32 / page_width;
    region.v = region.y as f32 / page_height;
    if region.degrees == 90 {
        region.u2 = (region.x + region.height) as f32 / page_width;
        region.v2 = (region.y + region.width) as f32 / page_height;
        std::mem::swap(&mut region.width, &mut region.height);
    } else {
        region.u2 = (region.x + region.width) as f32 / page_width;
        region.v2 = (region.y + region.height) as f32 / page_height;
    }
    Ok(())
}

fn parse_atlas(
    input: &str,
    mut loader: Option<(&Path, &mut dyn TextureLoader)>,
) -> Result<(Vec<AtlasPage>, Vec<AtlasRegion>), Error> {
    let mut pages: Vec<AtlasPage> = Vec::new();
    let mut regions: Vec<AtlasRegion> = Vec::new();

    let mut lines = input.lines();
    let mut line = lines.next();

    // Ignore empty lines before the first entry.
    while let Some(text) = line {
        if !text.trim().is_empty() {
            break;
        }
        line = lines.next();
    }

    // Header entries are reserved for future format versions; all keys are
    // silently ignored. The first empty or colon-less line ends the header.
    while let Some(text) = line {
        if text.trim().is_empty() || read_entry(text).is_none() {
            break;
        }
        line = lines.next();
    }

    let mut current_page: Option<usize> = None;
    let mut page_has_regions = false;

    while let Some(text) = line {
        if text.trim().is_empty() {
            // A blank line between a page's fields and its first region keeps
            // the page open; once the page has regions, a blank line closes
            // it so the next non-blank line starts a new page.
            if current_page.is_some() && page_has_regions {
                current_page = None;
            }
            line = lines.next();
            continue;
        }

        let Some(page_index) = current_page else {
            let mut page = AtlasPage::new(text.trim());
            loop {
                line = lines.next();
                let Some(entry) = line.and_then(read_entry) else {
                    break;
                };
                apply_page_field(&mut page, &entry);
            }
            if let Some((images_dir, loader)) = loader.as_mut() {
                let path = images_dir.join(&page.name);
                loader
                    .load(&mut page, &path)
                    .map_err(|source| Error::TextureLoad {
                        page: page.name.clone(),
                        path: path.display().to_string(),
                        source,
                    })?;
            }
            pages.push(page);
            current_page = Some(pages.len() - 1);
            page_has_regions = false;
            // `line` holds the terminating line, reprocessed by the outer loop.
            continue;
        };

        // Region names keep the line's raw spelling, untrimmed, unlike page names.
        let mut region = AtlasRegion::new(text, page_index);
        loop {
            line = lines.next();
            let Some(entry) = line.and_then(read_entry) else {
                break;
            };
            apply_region_field(&mut region, &entry);
        }
        resolve_region_geometry(&mut region, &pages[page_index])?;
        regions.push(region);
        page_has_regions = true;
    }

    if pages.is_empty() {
        return Err(Error::AtlasParse {
            message: "empty atlas".to_string(),
        });
    }

    Ok((pages, regions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn assert_approx(actual: f32, expected: f32) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= 1.0e-6,
            "expected {expected}, got {actual} (diff {diff})"
        );
    }

    #[test]
    fn read_entry_tokenizes_key_and_up_to_four_values() {
        let entry = read_entry("offsets: 3, 4, 10,20").unwrap();
        assert_eq!(entry.key, "offsets");
        assert_eq!(entry.count, 4);
        assert_eq!(entry.values, ["3", "4", "10", "20"]);
    }

    #[test]
    fn read_entry_truncates_fifth_value() {
        let entry = read_entry("pad: 1,2,3,4,5").unwrap();
        assert_eq!(entry.count, 4);
        assert_eq!(entry.values, ["1", "2", "3", "4"]);
    }

    #[test]
    fn read_entry_rejects_lines_without_colon_or_content() {
        assert!(read_entry("sprite1").is_none());
        assert!(read_entry("   ").is_none());
        assert!(read_entry("").is_none());
    }

    #[test]
    fn parse_page_and_region_with_uv_resolution() {
        let mut atlas = Atlas::parse(
            r#"page.png
size: 100,200
format: RGBA8888
filter: Linear,Linear
repeat: none

sprite1
bounds: 0,0,50,50
rotate: false
"#,
        )
        .unwrap();

        assert_eq!(atlas.pages.len(), 1);
        let page = &atlas.pages[0];
        assert_eq!(page.name, "page.png");
        assert_eq!(page.width, 100);
        assert_eq!(page.height, 200);
        assert_eq!(page.format, Format::RGBA8888);
        assert_eq!(page.min_filter, TextureFilter::Linear);
        assert_eq!(page.mag_filter, TextureFilter::Linear);
        assert_eq!(page.wrap_u, TextureWrap::ClampToEdge);
        assert_eq!(page.wrap_v, TextureWrap::ClampToEdge);

        assert_eq!(atlas.regions.len(), 1);
        {
            let region = atlas.find_region("sprite1").unwrap();
            assert_eq!(region.page, 0);
            assert_eq!(region.degrees, 0);
            assert_approx(region.u, 0.0);
            assert_approx(region.v, 0.0);
            assert_approx(region.u2, 0.5);
            assert_approx(region.v2, 0.25);
        }

        // Double flip restores the exact V values.
        atlas.flip_v();
        {
            let region = atlas.find_region("sprite1").unwrap();
            assert_approx(region.v, 1.0);
            assert_approx(region.v2, 0.75);
        }
        atlas.flip_v();
        let region = atlas.find_region("sprite1").unwrap();
        assert_eq!(region.v, 0.0);
        assert_eq!(region.v2, 0.25);
    }

    #[test]
    fn rotated_region_swaps_packed_size_after_uv() {
        let atlas = Atlas::parse(
            r#"page.png
size: 100,100

r
bounds: 10,20,30,40
rotate: true
"#,
        )
        .unwrap();

        let region = atlas.find_region("r").unwrap();
        assert_eq!(region.degrees, 90);
        // UVs span the on-texture footprint (pre-swap width/height).
        assert_approx(region.u, 0.1);
        assert_approx(region.v, 0.2);
        assert_approx(region.u2, 0.5);
        assert_approx(region.v2, 0.5);
        // Stored size is the unrotated visual footprint.
        assert_eq!(region.width, 40);
        assert_eq!(region.height, 30);
        // Original size was defaulted from the pre-swap packed size.
        assert_eq!(region.original_width, 30);
        assert_eq!(region.original_height, 40);
    }

    #[test]
    fn legacy_fields_and_offsets() {
        let atlas = Atlas::parse(
            r#"page.png
size: 64,64

a
xy: 4, 8
size: 10, 11
orig: 20, 21
offset: 3, 4
b
bounds: 1, 2, 3, 4
offsets: 5, 6, 7, 8
rotate: 270
index: 2
"#,
        )
        .unwrap();

        let a = atlas.find_region("a").unwrap();
        assert_eq!((a.x, a.y, a.width, a.height), (4, 8, 10, 11));
        assert_eq!((a.original_width, a.original_height), (20, 21));
        assert_eq!((a.offset_x, a.offset_y), (3, 4));

        let b = atlas.find_region("b").unwrap();
        assert_eq!((b.x, b.y, b.width, b.height), (1, 2, 3, 4));
        assert_eq!((b.offset_x, b.offset_y), (5, 6));
        assert_eq!((b.original_width, b.original_height), (7, 8));
        assert_eq!(b.degrees, 270);
        assert_eq!(b.index, 2);
    }

    #[test]
    fn unknown_region_fields_become_custom_metadata() {
        let atlas = Atlas::parse(
            r#"page.png
size: 64,64

r
bounds: 0,0,4,4
split: 1, 2, 3, 4
pad: 1, 2, 3, abc
"#,
        )
        .unwrap();

        let region = atlas.find_region("r").unwrap();
        assert_eq!(region.names, vec!["split", "pad"]);
        // Non-integer values silently default to 0.
        assert_eq!(region.values, vec![vec![1, 2, 3, 4], vec![1, 2, 3, 0]]);
    }

    #[test]
    fn regions_without_custom_fields_have_empty_metadata() {
        let atlas = Atlas::parse("page.png\nsize: 64,64\n\nr\nbounds: 0,0,4,4\n").unwrap();
        let region = atlas.find_region("r").unwrap();
        assert!(region.names.is_empty());
        assert!(region.values.is_empty());
    }

    #[test]
    fn header_entries_are_ignored() {
        let atlas = Atlas::parse(
            r#"
version: 4.3
hash: abc123

page.png
size: 64,64

r
bounds: 0,0,4,4
"#,
        )
        .unwrap();

        assert_eq!(atlas.pages.len(), 1);
        assert_eq!(atlas.pages[0].name, "page.png");
        assert_eq!(atlas.regions.len(), 1);
    }

    #[test]
    fn find_region_returns_first_duplicate() {
        let atlas = Atlas::parse(
            r#"page.png
size: 64,64

frame
bounds: 0,0,1,1
index: 0
frame
bounds: 8,0,1,1
index: 1
"#,
        )
        .unwrap();

        assert_eq!(atlas.regions.len(), 2);
        let region = atlas.find_region("frame").unwrap();
        assert_eq!(region.x, 0);
        assert_eq!(region.index, 0);
        assert!(atlas.find_region("missing").is_none());
    }

    #[test]
    fn multiple_pages_assign_region_owners() {
        let atlas = Atlas::parse(
            r#"page0.png
size: 32,32
r0
bounds: 0, 0, 1, 1

page1.png
size: 64,64
r1
bounds: 2, 3, 4, 5
"#,
        )
        .unwrap();

        assert_eq!(atlas.pages.len(), 2);
        assert_eq!(atlas.pages[1].name, "page1.png");
        assert_eq!(atlas.find_region("r0").unwrap().page, 0);
        assert_eq!(atlas.find_region("r1").unwrap().page, 1);
    }

    #[test]
    fn page_repeat_and_pma_fields() {
        let atlas = Atlas::parse(
            r#"page.png
size: 64,64
repeat: xy
pma: true

r
bounds: 0,0,1,1
"#,
        )
        .unwrap();

        let page = &atlas.pages[0];
        assert_eq!(page.wrap_u, TextureWrap::Repeat);
        assert_eq!(page.wrap_v, TextureWrap::Repeat);
        assert!(page.pma);
    }

    #[test]
    fn region_names_are_not_trimmed() {
        let atlas = Atlas::parse("page.png\nsize: 64,64\n\n  padded\nbounds: 0,0,1,1\n").unwrap();
        assert_eq!(atlas.regions[0].name, "  padded");
        assert!(atlas.find_region("padded").is_none());
    }

    #[test]
    fn zero_size_page_fails_region_resolution() {
        let err = Atlas::parse("page.png\n\nr\nbounds: 0,0,4,4\n").unwrap_err();
        match err {
            Error::AtlasParse { message } => assert!(message.contains("zero size")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(Atlas::parse("").is_err());
        assert!(Atlas::parse("\n\n").is_err());
    }

    #[derive(Default)]
    struct LoaderState {
        loaded: Vec<String>,
        unloaded: Vec<u32>,
        fail: bool,
    }

    struct RecordingLoader(Rc<RefCell<LoaderState>>);

    impl TextureLoader for RecordingLoader {
        fn load(
            &mut self,
            page: &mut AtlasPage,
            path: &Path,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let mut state = self.0.borrow_mut();
            if state.fail {
                return Err("texture file missing".into());
            }
            state.loaded.push(path.display().to_string());
            page.renderer_object = Some(Box::new(state.loaded.len() as u32));
            Ok(())
        }

        fn unload(&mut self, texture: Box<dyn Any + Send + Sync>) {
            let handle = *texture.downcast::<u32>().unwrap();
            self.0.borrow_mut().unloaded.push(handle);
        }
    }

    #[test]
    fn loader_receives_joined_image_paths_and_dispose_unloads() {
        let state = Rc::new(RefCell::new(LoaderState::default()));
        let mut atlas = Atlas::parse_with_loader(
            r#"page0.png
size: 32,32
r0
bounds: 0, 0, 1, 1

page1.png
size: 64,64
r1
bounds: 2, 3, 4, 5
"#,
            Path::new("images"),
            Box::new(RecordingLoader(Rc::clone(&state))),
        )
        .unwrap();

        let expected = vec![
            Path::new("images").join("page0.png").display().to_string(),
            Path::new("images").join("page1.png").display().to_string(),
        ];
        assert_eq!(state.borrow().loaded, expected);
        assert!(atlas.pages.iter().all(|p| p.renderer_object.is_some()));

        atlas.dispose();
        assert_eq!(state.borrow().unloaded, vec![1, 2]);
        assert!(atlas.pages.iter().all(|p| p.renderer_object.is_none()));

        // A second dispose has nothing left to release.
        atlas.dispose();
        assert_eq!(state.borrow().unloaded.len(), 2);
    }

    #[test]
    fn loader_failure_aborts_the_parse_with_page_context() {
        let state = Rc::new(RefCell::new(LoaderState {
            fail: true,
            ..LoaderState::default()
        }));
        let err = Atlas::parse_with_loader(
            "page.png\nsize: 32,32\n\nr\nbounds: 0,0,1,1\n",
            Path::new("images"),
            Box::new(RecordingLoader(state)),
        )
        .unwrap_err();

        match err {
            Error::TextureLoad { page, path, .. } => {
                assert_eq!(page, "page.png");
                assert!(path.contains("page.png"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn dispose_without_loader_is_a_no_op() {
        let mut atlas = Atlas::from_parts(vec![AtlasPage::new("page.png")], Vec::new());
        atlas.dispose();
        assert_eq!(atlas.pages.len(), 1);
    }
}
