use std::path::{Path, PathBuf};

/// `<dir>/<stem><suffix>.<ext>`，与输入位于同一目录。
pub fn default_output_path(input: &Path, suffix: &str) -> PathBuf {
    let mut name = input
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    if let Some(extension) = input.extension() {
        name.push(".");
        name.push(extension);
    }
    input.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_goes_between_stem_and_extension() {
        assert_eq!(
            default_output_path(Path::new("parts/plate.dxf"), "-auto-bound"),
            PathBuf::from("parts/plate-auto-bound.dxf")
        );
    }

    #[test]
    fn extension_case_and_dots_in_stem_are_preserved() {
        assert_eq!(
            default_output_path(Path::new("v1.2.PLATE.DXF"), "-joined"),
            PathBuf::from("v1.2.PLATE-joined.DXF")
        );
    }

    #[test]
    fn input_without_extension_gets_only_the_suffix() {
        assert_eq!(
            default_output_path(Path::new("/tmp/drawing"), "-auto-bound"),
            PathBuf::from("/tmp/drawing-auto-bound")
        );
    }
}
