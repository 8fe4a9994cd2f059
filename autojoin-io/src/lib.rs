use std::convert::TryFrom;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use autojoin_core::{
    drawing::{Drawing, DrawingHeader, Entity, Layer, RawEntity},
    geometry::Point2,
    primitive::Style,
};
use thiserror::Error;
use tracing::{debug, warn};

/// 能在目标矢量绘图工具中保留单位的 DXF 版本（AutoCAD 2018）。
pub const PREFERRED_VERSION: &str = "AC1032";

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Drawing, IoError>;
}

pub trait DocumentSaver {
    fn save(&self, drawing: &Drawing, path: &Path) -> Result<(), IoError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    /// 解析内存中的 DXF 文本。
    pub fn parse_str(&self, source: &str) -> Result<Drawing, IoError> {
        DxfParser::new(source).parse().map_err(IoError::from)
    }

    /// 生成 DXF 文本，不落盘。
    pub fn to_dxf_string(&self, drawing: &Drawing) -> String {
        DxfWriter::default().write(drawing)
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Drawing, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let drawing = self.parse_str(&data)?;
        debug!(
            path = %path.display(),
            entities = drawing.entities().count(),
            version = drawing.header().version.as_deref().unwrap_or("?"),
            "DXF 读取完成"
        );
        Ok(drawing)
    }
}

impl DocumentSaver for DxfFacade {
    /// 先写同目录临时文件再改名，失败时不会留下半截输出。
    fn save(&self, drawing: &Drawing, path: &Path) -> Result<(), IoError> {
        let content = self.to_dxf_string(drawing);
        let partial = partial_path(path);
        let write_error = |source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        };
        if let Err(source) = fs::write(&partial, content.as_bytes()) {
            let _ = fs::remove_file(&partial);
            return Err(write_error(source));
        }
        if let Err(source) = fs::rename(&partial, path) {
            let _ = fs::remove_file(&partial);
            return Err(write_error(source));
        }
        debug!(path = %path.display(), bytes = content.len(), "DXF 写出完成");
        Ok(())
    }
}

/// 输入版本不是 AC1032 时给出提示；返回是否发出了警告。
pub fn warn_on_version(header: &DrawingHeader) -> bool {
    match header.version.as_deref() {
        Some(PREFERRED_VERSION) => false,
        other => {
            warn!(
                version = other.unwrap_or("未知"),
                "输入不是 2018 格式（AC1032），导入矢量绘图工具时单位可能丢失"
            );
            true
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

#[derive(Debug)]
enum DxfError {
    Unsupported { feature: String },
    Invalid { message: String },
}

impl DxfError {
    fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

impl From<DxfError> for IoError {
    fn from(err: DxfError) -> Self {
        match err {
            DxfError::Unsupported { feature } => IoError::UnsupportedFeature(feature),
            DxfError::Invalid { message } => IoError::InvalidDocument(message),
        }
    }
}

/// 句柄与所有者引用在重新写出时失效，原样实体中剔除这些组码。
fn is_handle_code(code: i32) -> bool {
    matches!(code, 5 | 102 | 105 | 330 | 360)
}

struct DxfParser<'a> {
    reader: DxfReader<'a>,
}

impl<'a> DxfParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
        }
    }

    fn parse(mut self) -> Result<Drawing, DxfError> {
        let mut drawing = Drawing::new();
        while let Some((code, value)) = self.reader.next_pair()? {
            if code == 999 {
                continue;
            }
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.trim() {
                "SECTION" => {
                    let (name_code, name) = self
                        .reader
                        .next_pair()?
                        .ok_or_else(|| DxfError::invalid("SECTION 缺少名称（组码 2）"))?;
                    if name_code != 2 {
                        return Err(DxfError::invalid(format!(
                            "SECTION 名称使用了组码 {name_code}（期望 2）"
                        )));
                    }
                    match name.trim() {
                        "HEADER" => self.parse_header(&mut drawing)?,
                        "TABLES" => self.parse_tables(&mut drawing)?,
                        "BLOCKS" => self.parse_blocks(&mut drawing)?,
                        "ENTITIES" => self.parse_entities(&mut drawing)?,
                        _ => self.skip_section()?,
                    }
                }
                "EOF" => break,
                unexpected => {
                    return Err(DxfError::invalid(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }
        Ok(drawing)
    }

    fn skip_section(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some(_) => continue,
                None => {
                    return Err(DxfError::invalid("SECTION 未找到 ENDSEC 终止标记"));
                }
            }
        }
        Ok(())
    }

    fn parse_header(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        let mut header = DrawingHeader::default();
        let mut variable: Option<String> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some((9, name)) => variable = Some(name.trim().to_string()),
                Some((code, value)) => match (variable.as_deref(), code) {
                    (Some("$ACADVER"), 1) => header.version = Some(value.trim().to_string()),
                    (Some("$INSUNITS"), 70) => {
                        header.units = Some(parse_i16(&value, "$INSUNITS")?);
                    }
                    _ => {}
                },
                None => return Err(DxfError::invalid("HEADER 段提前结束")),
            }
        }
        drawing.set_header(header);
        Ok(())
    }

    /// 只读取图层表中的名称与颜色，其余表跳过。
    fn parse_tables(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("TABLES 段提前结束")),
            };
            if code != 0 {
                continue;
            }
            match value.trim() {
                "ENDSEC" => break,
                "LAYER" => {
                    let layer = self.parse_layer_record()?;
                    drawing.define_layer(layer);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_layer_record(&mut self) -> Result<Layer, DxfError> {
        let mut name = None;
        let mut color = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((2, value)) => name = Some(value.trim().to_string()),
                Some((62, value)) => color = Some(parse_i16(&value, "LAYER 颜色")?),
                Some(_) => {}
                None => return Err(DxfError::invalid("LAYER 记录未正确结束")),
            }
        }
        let name = name.ok_or_else(|| DxfError::invalid("LAYER 缺少名称（组码 2）"))?;
        Ok(Layer { name, color })
    }

    /// 块定义整体原样保留，保证原样写回的 INSERT 仍能解析。
    fn parse_blocks(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        let mut pairs = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some((code, _)) if is_handle_code(code) => {}
                Some(pair) => pairs.push(pair),
                None => return Err(DxfError::invalid("BLOCKS 段提前结束")),
            }
        }
        drawing.set_blocks(pairs);
        Ok(())
    }

    fn parse_entities(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("ENTITIES 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "ENTITIES 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.trim() {
                "ENDSEC" => break,
                kind @ ("LINE" | "ARC" | "CIRCLE") => {
                    let body = self.entity_body(kind)?;
                    if in_paper_space(&body) {
                        let (raw, style) = raw_entity(kind, body)?;
                        drawing.add_raw(raw, style);
                        continue;
                    }
                    match kind {
                        "LINE" => parse_line(body, drawing)?,
                        "ARC" => parse_arc(body, drawing)?,
                        _ => parse_circle(body, drawing)?,
                    }
                }
                other => {
                    let body = self.entity_body(other)?;
                    let (raw, style) = raw_entity(other, body)?;
                    drawing.add_raw(raw, style);
                }
            }
        }
        Ok(())
    }

    /// 读取到下一个组码 0 为止的全部组码对。
    fn entity_body(&mut self, kind: &str) -> Result<Vec<(i32, String)>, DxfError> {
        let mut pairs = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some(pair) => pairs.push(pair),
                None => return Err(DxfError::invalid(format!("{kind} 未正确结束"))),
            }
        }
        Ok(pairs)
    }
}

fn parse_line(body: Vec<(i32, String)>, drawing: &mut Drawing) -> Result<(), DxfError> {
    let mut style = StyleBuilder::default();
    let mut start_x = None;
    let mut start_y = None;
    let mut end_x = None;
    let mut end_y = None;
    for (code, value) in body {
        match code {
            10 => assign_coord(&mut start_x, &value, "LINE 起点 X（组码 10）")?,
            20 => assign_coord(&mut start_y, &value, "LINE 起点 Y（组码 20）")?,
            11 => assign_coord(&mut end_x, &value, "LINE 终点 X（组码 11）")?,
            21 => assign_coord(&mut end_y, &value, "LINE 终点 Y（组码 21）")?,
            _ => style.accept(code, &value, "LINE")?,
        }
    }

    let sx = start_x.ok_or_else(|| DxfError::invalid("LINE 缺少起点 X（组码 10）"))?;
    let sy = start_y.ok_or_else(|| DxfError::invalid("LINE 缺少起点 Y（组码 20）"))?;
    let ex = end_x.ok_or_else(|| DxfError::invalid("LINE 缺少终点 X（组码 11）"))?;
    let ey = end_y.ok_or_else(|| DxfError::invalid("LINE 缺少终点 Y（组码 21）"))?;

    drawing.add_line(Point2::new(sx, sy), Point2::new(ex, ey), style.build());
    Ok(())
}

fn parse_circle(body: Vec<(i32, String)>, drawing: &mut Drawing) -> Result<(), DxfError> {
    let mut style = StyleBuilder::default();
    let mut center_x = None;
    let mut center_y = None;
    let mut radius = None;
    for (code, value) in body {
        match code {
            10 => assign_coord(&mut center_x, &value, "CIRCLE 圆心 X（组码 10）")?,
            20 => assign_coord(&mut center_y, &value, "CIRCLE 圆心 Y（组码 20）")?,
            40 => assign_coord(&mut radius, &value, "CIRCLE 半径（组码 40）")?,
            _ => style.accept(code, &value, "CIRCLE")?,
        }
    }

    let cx = center_x.ok_or_else(|| DxfError::invalid("CIRCLE 缺少圆心 X（组码 10）"))?;
    let cy = center_y.ok_or_else(|| DxfError::invalid("CIRCLE 缺少圆心 Y（组码 20）"))?;
    let radius = radius.ok_or_else(|| DxfError::invalid("CIRCLE 缺少半径（组码 40）"))?;
    let cx = if style.mirrored { -cx } else { cx };

    drawing.add_circle(Point2::new(cx, cy), radius, style.build());
    Ok(())
}

/// 角度以度存储于文件中，转为弧度。拉伸方向为 -Z 时按镜像换算到世界坐标。
fn parse_arc(body: Vec<(i32, String)>, drawing: &mut Drawing) -> Result<(), DxfError> {
    let mut style = StyleBuilder::default();
    let mut center_x = None;
    let mut center_y = None;
    let mut radius = None;
    let mut start_angle = None;
    let mut end_angle = None;
    for (code, value) in body {
        match code {
            10 => assign_coord(&mut center_x, &value, "ARC 圆心 X（组码 10）")?,
            20 => assign_coord(&mut center_y, &value, "ARC 圆心 Y（组码 20）")?,
            40 => assign_coord(&mut radius, &value, "ARC 半径（组码 40）")?,
            50 => assign_coord(&mut start_angle, &value, "ARC 起始角（组码 50）")?,
            51 => assign_coord(&mut end_angle, &value, "ARC 终止角（组码 51）")?,
            _ => style.accept(code, &value, "ARC")?,
        }
    }

    let cx = center_x.ok_or_else(|| DxfError::invalid("ARC 缺少圆心 X（组码 10）"))?;
    let cy = center_y.ok_or_else(|| DxfError::invalid("ARC 缺少圆心 Y（组码 20）"))?;
    let radius = radius.ok_or_else(|| DxfError::invalid("ARC 缺少半径（组码 40）"))?;
    let start = start_angle
        .ok_or_else(|| DxfError::invalid("ARC 缺少起始角（组码 50）"))?
        .to_radians();
    let end = end_angle
        .ok_or_else(|| DxfError::invalid("ARC 缺少终止角（组码 51）"))?
        .to_radians();

    let (cx, start, end) = if style.mirrored {
        (-cx, std::f64::consts::PI - end, std::f64::consts::PI - start)
    } else {
        (cx, start, end)
    };
    drawing.add_arc(Point2::new(cx, cy), radius, start, end, style.build());
    Ok(())
}

/// 非 LINE/ARC/CIRCLE 或位于图纸空间的实体：去掉句柄后原样保留。
fn raw_entity(kind: &str, body: Vec<(i32, String)>) -> Result<(RawEntity, Style), DxfError> {
    let mut style = StyleBuilder::default();
    let mut pairs = Vec::with_capacity(body.len());
    for (code, value) in body {
        if is_handle_code(code) {
            continue;
        }
        if matches!(code, 6 | 8 | 62 | 420) {
            style.accept(code, &value, kind)?;
        }
        pairs.push((code, value));
    }
    Ok((
        RawEntity {
            kind: kind.to_string(),
            pairs,
        },
        style.build(),
    ))
}

/// 组码 67 为 1 表示实体位于图纸空间，不参与连接。
fn in_paper_space(body: &[(i32, String)]) -> bool {
    body.iter()
        .any(|(code, value)| *code == 67 && value.trim() == "1")
}

/// 图层（组码 8）、线型（6）、颜色（62）、真彩色（420）与拉伸方向 Z 分量（230）。
#[derive(Default)]
struct StyleBuilder {
    layer: Option<String>,
    linetype: Option<String>,
    color: Option<i16>,
    true_color: Option<i32>,
    mirrored: bool,
}

impl StyleBuilder {
    fn accept(&mut self, code: i32, value: &str, kind: &str) -> Result<(), DxfError> {
        match code {
            6 => self.linetype = Some(value.trim().to_string()),
            8 => self.layer = Some(value.trim().to_string()),
            420 => {
                self.true_color = Some(parse_i32(value, &format!("{kind} 真彩色（组码 420）"))?);
            }
            62 => self.color = Some(parse_i16(value, &format!("{kind} 颜色（组码 62）"))?),
            230 => {
                let z = parse_f64(value, &format!("{kind} 拉伸方向 Z（组码 230）"))?;
                if (z.abs() - 1.0).abs() > 1e-9 {
                    return Err(DxfError::unsupported(format!(
                        "{kind} 的拉伸方向不垂直于 XY 平面（Z = {z}）"
                    )));
                }
                self.mirrored = z < 0.0;
            }
            _ => {}
        }
        Ok(())
    }

    fn build(self) -> Style {
        Style {
            layer: self.layer.unwrap_or_else(|| "0".to_string()),
            linetype: self.linetype,
            color: self.color,
            true_color: self.true_color,
        }
    }
}

/// 精简的 DXF 写出器：不写句柄，只包含 HEADER、TABLES(LAYER)、BLOCKS 与 ENTITIES。
#[derive(Default)]
struct DxfWriter {
    out: String,
}

impl DxfWriter {
    fn write(mut self, drawing: &Drawing) -> String {
        self.write_header(drawing.header());
        self.write_layers(drawing);
        if !drawing.blocks().is_empty() {
            self.push_pair(0, "SECTION");
            self.push_pair(2, "BLOCKS");
            for (code, value) in drawing.blocks() {
                self.push_pair(*code, value);
            }
            self.push_pair(0, "ENDSEC");
        }
        self.push_pair(0, "SECTION");
        self.push_pair(2, "ENTITIES");
        for item in drawing.entities() {
            self.write_entity(&item.entity, &item.style);
        }
        self.push_pair(0, "ENDSEC");
        self.push_pair(0, "EOF");
        self.out
    }

    fn push_pair(&mut self, code: i32, value: impl Display) {
        self.out.push_str(&format!("{code:>3}\n{value}\n"));
    }

    fn push_point(&mut self, code: i32, point: Point2) {
        self.push_pair(code, point.x());
        self.push_pair(code + 10, point.y());
    }

    fn write_header(&mut self, header: &DrawingHeader) {
        self.push_pair(0, "SECTION");
        self.push_pair(2, "HEADER");
        if let Some(version) = &header.version {
            self.push_pair(9, "$ACADVER");
            self.push_pair(1, version);
        }
        if let Some(units) = header.units {
            self.push_pair(9, "$INSUNITS");
            self.push_pair(70, units);
        }
        self.push_pair(0, "ENDSEC");
    }

    fn write_layers(&mut self, drawing: &Drawing) {
        let layers: Vec<&Layer> = drawing.layers().collect();
        self.push_pair(0, "SECTION");
        self.push_pair(2, "TABLES");
        self.push_pair(0, "TABLE");
        self.push_pair(2, "LAYER");
        self.push_pair(70, layers.len());
        for layer in layers {
            self.push_pair(0, "LAYER");
            self.push_pair(2, &layer.name);
            self.push_pair(70, 0);
            self.push_pair(62, layer.color.unwrap_or(7));
            self.push_pair(6, "CONTINUOUS");
        }
        self.push_pair(0, "ENDTAB");
        self.push_pair(0, "ENDSEC");
    }

    fn write_style(&mut self, style: &Style) {
        self.push_pair(8, &style.layer);
        if let Some(linetype) = &style.linetype {
            self.push_pair(6, linetype);
        }
        if let Some(color) = style.color {
            self.push_pair(62, color);
        }
        if let Some(true_color) = style.true_color {
            self.push_pair(420, true_color);
        }
    }

    fn write_entity(&mut self, entity: &Entity, style: &Style) {
        match entity {
            Entity::Line(line) => {
                self.push_pair(0, "LINE");
                self.write_style(style);
                self.push_point(10, line.start);
                self.push_point(11, line.end);
            }
            Entity::Arc(arc) => {
                self.push_pair(0, "ARC");
                self.write_style(style);
                self.push_point(10, arc.center);
                self.push_pair(40, arc.radius);
                self.push_pair(50, arc.start_angle.to_degrees());
                self.push_pair(51, arc.end_angle.to_degrees());
            }
            Entity::Circle(circle) => {
                self.push_pair(0, "CIRCLE");
                self.write_style(style);
                self.push_point(10, circle.center);
                self.push_pair(40, circle.radius);
            }
            Entity::Polyline(polyline) => {
                self.push_pair(0, "LWPOLYLINE");
                self.write_style(style);
                self.push_pair(90, polyline.vertices.len());
                self.push_pair(70, u8::from(polyline.is_closed));
                for vertex in &polyline.vertices {
                    self.push_point(10, *vertex);
                }
            }
            Entity::Raw(raw) => {
                self.push_pair(0, &raw.kind);
                for (code, value) in &raw.pairs {
                    self.push_pair(*code, value);
                }
            }
        }
    }
}

struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.trim_start_matches('\u{feff}').lines(),
            buffer: None,
            line_number: 0,
        }
    }

    fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }

        let code_line = loop {
            match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    // 文件末尾允许存在空行
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Ok(None),
            }
        };

        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(DxfError::invalid(format!(
                    "文件在第 {} 行结束，缺少与组码对应的值行",
                    self.line_number
                )));
            }
        };

        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DxfError::invalid(format!(
                "第 {} 行的组码 \"{}\" 无法解析为整数",
                self.line_number - 1,
                code_line.trim()
            ))
        })?;
        let value = value_line.trim_end_matches('\r').to_string();
        Ok(Some((code, value)))
    }

    /// 只缓存一个组码对；调用方保证回退前已取出上一次回退的值。
    fn put_back(&mut self, pair: (i32, String)) {
        debug_assert!(self.buffer.is_none(), "DXF 组码对只能回退一次");
        self.buffer = Some(pair);
    }
}

fn assign_coord(slot: &mut Option<f64>, raw: &str, context: &str) -> Result<(), DxfError> {
    if slot.is_some() {
        return Err(DxfError::invalid(format!("{context} 出现重复值")));
    }
    *slot = Some(parse_f64(raw, context)?);
    Ok(())
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i32(raw: &str, context: &str) -> Result<i32, DxfError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i16(raw: &str, context: &str) -> Result<i16, DxfError> {
    let value = parse_i32(raw, context)?;
    i16::try_from(value)
        .map_err(|_| DxfError::invalid(format!("{context} 超出 i16 范围（值：{value}）")))
}
