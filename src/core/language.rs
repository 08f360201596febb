//! Language alias table shared by the fence parser, classifier and
//! path inference.
//!
//! Fence tags are free-form (`py`, `Python`, `c#`, `shell-session` ...);
//! everything is normalized to one canonical name before comparison.

/// What a language tag tells us about a block's purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageKind {
    /// Source code that can live in a file
    Code,
    /// Commands meant to be typed into a shell
    Shell,
    /// Structured data / configuration
    Data,
    /// Program output, logs, plain prose
    Output,
    /// Markup and styles (still file-backed)
    Markup,
}

#[derive(Debug)]
pub struct LanguageInfo {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub extensions: &'static [&'static str],
    pub kind: LanguageKind,
    /// Line comment prefix used by `File:` hints
    pub line_comment: Option<&'static str>,
}

impl LanguageInfo {
    /// Extension used when synthesizing a new file
    pub fn canonical_extension(&self) -> Option<&'static str> {
        self.extensions.first().copied()
    }

    /// Whether files in this language conventionally use PascalCase names
    pub fn pascal_case_files(&self) -> bool {
        matches!(self.name, "csharp" | "java" | "kotlin" | "swift" | "scala" | "fsharp")
    }
}

macro_rules! lang {
    ($name:expr, [$($alias:expr),*], [$($ext:expr),*], $kind:ident, $comment:expr) => {
        LanguageInfo {
            name: $name,
            aliases: &[$($alias),*],
            extensions: &[$($ext),*],
            kind: LanguageKind::$kind,
            line_comment: $comment,
        }
    };
}

static LANGUAGES: &[LanguageInfo] = &[
    lang!("rust", ["rs"], ["rs"], Code, Some("//")),
    lang!("python", ["py", "python3", "py3"], ["py", "pyi"], Code, Some("#")),
    lang!("javascript", ["js", "node", "mjs", "cjs"], ["js", "mjs", "cjs"], Code, Some("//")),
    lang!("jsx", [], ["jsx"], Code, Some("//")),
    lang!("typescript", ["ts"], ["ts", "mts", "cts"], Code, Some("//")),
    lang!("tsx", [], ["tsx"], Code, Some("//")),
    lang!("csharp", ["cs", "c#"], ["cs"], Code, Some("//")),
    lang!("fsharp", ["fs", "f#"], ["fs", "fsx"], Code, Some("//")),
    lang!("java", [], ["java"], Code, Some("//")),
    lang!("kotlin", ["kt", "kts"], ["kt", "kts"], Code, Some("//")),
    lang!("scala", [], ["scala"], Code, Some("//")),
    lang!("swift", [], ["swift"], Code, Some("//")),
    lang!("go", ["golang"], ["go"], Code, Some("//")),
    lang!("c", ["h"], ["c", "h"], Code, Some("//")),
    lang!("cpp", ["c++", "cc", "cxx", "hpp"], ["cpp", "cc", "cxx", "hpp", "hh"], Code, Some("//")),
    lang!("ruby", ["rb"], ["rb"], Code, Some("#")),
    lang!("php", [], ["php"], Code, Some("//")),
    lang!("lua", [], ["lua"], Code, Some("--")),
    lang!("sql", ["postgres", "mysql", "sqlite"], ["sql"], Code, Some("--")),
    lang!("dart", [], ["dart"], Code, Some("//")),
    lang!("haskell", ["hs"], ["hs"], Code, Some("--")),
    lang!("elixir", ["ex", "exs"], ["ex", "exs"], Code, Some("#")),
    lang!("zig", [], ["zig"], Code, Some("//")),
    lang!("html", ["htm", "xhtml"], ["html", "htm"], Markup, None),
    lang!("css", [], ["css"], Markup, None),
    lang!("scss", ["sass"], ["scss", "sass"], Markup, Some("//")),
    lang!("vue", [], ["vue"], Markup, None),
    lang!("svelte", [], ["svelte"], Markup, None),
    lang!("markdown", ["md"], ["md", "markdown"], Markup, None),
    lang!("dockerfile", ["docker"], ["dockerfile"], Code, Some("#")),
    lang!("makefile", ["make", "mk"], ["mk"], Code, Some("#")),
    lang!("json", ["jsonc", "json5"], ["json", "jsonc"], Data, None),
    lang!("yaml", ["yml"], ["yaml", "yml"], Data, Some("#")),
    lang!("toml", [], ["toml"], Data, Some("#")),
    lang!("xml", ["xaml", "csproj", "svg", "plist"], ["xml", "xaml", "csproj", "svg"], Data, None),
    lang!("ini", ["cfg", "conf", "properties"], ["ini", "cfg", "conf"], Data, Some("#")),
    lang!("env", ["dotenv"], ["env"], Data, Some("#")),
    lang!("bash", ["sh", "zsh", "shell", "fish", "ksh"], ["sh", "bash", "zsh"], Shell, Some("#")),
    lang!("console", ["shell-session", "terminal", "shellsession", "cmd", "bat", "batch"], [], Shell, None),
    lang!("powershell", ["ps", "ps1", "pwsh"], ["ps1"], Shell, Some("#")),
    lang!("text", ["txt", "plaintext", "plain", "output", "log", "stdout", "stderr", "none"], ["txt", "log"], Output, None),
    lang!("diff", ["patch", "udiff"], ["diff", "patch"], Output, None),
];

/// Look a fence tag up by name or alias (case-insensitive)
pub fn lookup(tag: &str) -> Option<&'static LanguageInfo> {
    let t = tag.trim().to_ascii_lowercase();
    if t.is_empty() {
        return None;
    }
    LANGUAGES
        .iter()
        .find(|l| l.name == t || l.aliases.iter().any(|a| *a == t))
}

/// Canonical language name for a tag, or the lowercased tag if unknown
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        lookup(trimmed)
            .map(|l| l.name.to_string())
            .unwrap_or_else(|| trimmed.to_ascii_lowercase()),
    )
}

/// Language implied by a path's extension or well-known file name
pub fn from_path(path: &str) -> Option<&'static LanguageInfo> {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let lower = file.to_ascii_lowercase();

    match lower.as_str() {
        "dockerfile" => return lookup("dockerfile"),
        "makefile" | "gnumakefile" => return lookup("makefile"),
        ".env" => return lookup("env"),
        _ => {}
    }

    let ext = lower.rsplit_once('.').map(|(_, e)| e)?;
    LANGUAGES
        .iter()
        .find(|l| l.extensions.iter().any(|e| *e == ext))
}

pub fn kind_of(tag: Option<&str>) -> Option<LanguageKind> {
    tag.and_then(lookup).map(|l| l.kind)
}

/// True when two (possibly aliased) tags name the same language
pub fn same_language(a: &str, b: &str) -> bool {
    match (normalize_tag(a), normalize_tag(b)) {
        (Some(x), Some(y)) => x == y || related(&x, &y),
        _ => false,
    }
}

/// Superset dialects that share files with their base language
fn related(a: &str, b: &str) -> bool {
    const FAMILIES: &[&[&str]] = &[
        &["javascript", "jsx"],
        &["typescript", "tsx"],
        &["c", "cpp"],
        &["css", "scss"],
    ];
    FAMILIES
        .iter()
        .any(|fam| fam.contains(&a) && fam.contains(&b))
}
