//! In-memory feature layers backed by shapefiles.
//!
//! A layer is an ordered list of features (geometry plus attribute row) and
//! an ordered field schema. A feature's FID is its position in the layer.

use std::{
    io::{Seek, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use shapefile::{
    dbase::{self, FieldName, FieldType, FieldValue, Record, TableWriterBuilder},
    Shape,
};
use tracing::{debug, warn};

/// Storage type of an attribute field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Character { length: u8 },
    Numeric { length: u8, decimals: u8 },
    Float { length: u8, decimals: u8 },
    Integer,
    Double,
    Logical,
    Date,
}

impl FieldKind {
    /// Numeric field wide enough for a feature ID.
    pub const ID: FieldKind = FieldKind::Numeric {
        length: 10,
        decimals: 0,
    };

    /// Whether the dbf type can store an unset value. Binary integer and
    /// double columns cannot.
    pub fn is_nullable(&self) -> bool {
        !matches!(self, FieldKind::Integer | FieldKind::Double)
    }

    /// The value an unset field holds. Non-nullable kinds get zero.
    pub fn null_value(&self) -> FieldValue {
        match self {
            FieldKind::Character { .. } => FieldValue::Character(None),
            FieldKind::Numeric { .. } => FieldValue::Numeric(None),
            FieldKind::Float { .. } => FieldValue::Float(None),
            FieldKind::Integer => FieldValue::Integer(0),
            FieldKind::Double => FieldValue::Double(0.0),
            FieldKind::Logical => FieldValue::Logical(None),
            FieldKind::Date => FieldValue::Date(None),
        }
    }

    fn add_to(&self, builder: TableWriterBuilder, name: FieldName) -> TableWriterBuilder {
        match *self {
            FieldKind::Character { length } => builder.add_character_field(name, length),
            FieldKind::Numeric { length, decimals } => {
                builder.add_numeric_field(name, length, decimals)
            }
            FieldKind::Float { length, decimals } => builder.add_float_field(name, length, decimals),
            FieldKind::Integer => builder.add_integer_field(name),
            FieldKind::Double => builder.add_double_field(name),
            FieldKind::Logical => builder.add_logical_field(name),
            FieldKind::Date => builder.add_date_field(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        FieldDef {
            name: name.to_string(),
            kind,
        }
    }
}

/// Broad geometry family of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

pub fn geometry_kind(shape: &Shape) -> Option<GeometryKind> {
    match shape {
        Shape::NullShape => None,
        Shape::Point(_)
        | Shape::PointM(_)
        | Shape::PointZ(_)
        | Shape::Multipoint(_)
        | Shape::MultipointM(_)
        | Shape::MultipointZ(_) => Some(GeometryKind::Point),
        Shape::Polyline(_) | Shape::PolylineM(_) | Shape::PolylineZ(_) => Some(GeometryKind::Line),
        Shape::Polygon(_) | Shape::PolygonM(_) | Shape::PolygonZ(_) | Shape::Multipatch(_) => {
            Some(GeometryKind::Polygon)
        }
    }
}

pub struct Feature {
    pub shape: Shape,
    pub record: Record,
}

#[derive(Default)]
pub struct FeatureLayer {
    fields: Vec<FieldDef>,
    features: Vec<Feature>,
}

impl FeatureLayer {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        FeatureLayer {
            fields,
            features: Vec::new(),
        }
    }

    /// Reads a shapefile and its attribute table.
    pub fn open(path: &Path) -> Result<Self> {
        let dbf_path = path.with_extension("dbf");
        let table = dbase::Reader::from_path(&dbf_path)
            .with_context(|| format!("Failed to open attribute table {}", dbf_path.display()))?;
        let field_info: Vec<(String, FieldType, u8)> = table
            .fields()
            .iter()
            .map(|f| (f.name().to_string(), f.field_type(), f.length()))
            .collect();

        let mut reader = shapefile::Reader::from_path(path)
            .with_context(|| format!("Failed to open shapefile {}", path.display()))?;
        let mut features = Vec::new();
        for item in reader.iter_shapes_and_records() {
            let (shape, record) =
                item.with_context(|| format!("Failed to read feature from {}", path.display()))?;
            features.push(Feature { shape, record });
        }

        let fields = field_info
            .into_iter()
            .map(|(name, field_type, length)| {
                let kind = field_kind(&name, field_type, length, &features)?;
                Ok(FieldDef { name, kind })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(path = %path.display(), features = features.len(), fields = fields.len(), "Opened layer");

        Ok(FeatureLayer { fields, features })
    }

    /// Writes the layer as a `.shp`/`.shx`/`.dbf` triple.
    pub fn save(&self, path: &Path) -> Result<PathBuf> {
        let mut builder = TableWriterBuilder::new();
        for field in &self.fields {
            let name = FieldName::try_from(field.name.as_str())
                .map_err(|e| anyhow!("Invalid field name `{}`: {:?}", field.name, e))?;
            builder = field.kind.add_to(builder, name);
        }

        let mut writer = shapefile::Writer::from_path(path, builder)
            .with_context(|| format!("Failed to create shapefile {}", path.display()))?;

        let mut skipped = 0;
        for feature in &self.features {
            if !write_feature(&mut writer, feature)
                .with_context(|| format!("Failed to write feature to {}", path.display()))?
            {
                skipped += 1;
            }
        }
        if skipped > 0 {
            warn!(path = %path.display(), skipped, "Null shapes were not written");
        }

        Ok(path.to_path_buf())
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Geometry family of the first non-null shape.
    pub fn geometry_kind(&self) -> Option<GeometryKind> {
        self.features.iter().find_map(|f| geometry_kind(&f.shape))
    }

    /// Appends a feature. Fields missing from `record` are set to null.
    pub fn push(&mut self, shape: Shape, mut record: Record) {
        for field in &self.fields {
            if record.get(&field.name).is_none() {
                record.insert(field.name.clone(), field.kind.null_value());
            }
        }
        self.features.push(Feature { shape, record });
    }

    /// Adds a field unless one with the same name exists. Returns whether it
    /// was added.
    pub fn add_field(&mut self, field: FieldDef) -> Result<bool> {
        if self.has_field(&field.name) {
            return Ok(false);
        }
        if field.name.is_empty() || field.name.len() > 10 {
            bail!("Field name `{}` must be 1 to 10 characters", field.name);
        }
        if !field.kind.is_nullable() && !self.features.is_empty() {
            bail!(
                "Field `{}` of type {:?} cannot be left unset on existing rows",
                field.name,
                field.kind
            );
        }

        for feature in &mut self.features {
            feature
                .record
                .insert(field.name.clone(), field.kind.null_value());
        }
        self.fields.push(field);

        Ok(true)
    }

    /// Values of one field, in feature order.
    pub fn values<'a>(&'a self, field: &'a str) -> Result<impl Iterator<Item = &'a FieldValue> + 'a> {
        if !self.has_field(field) {
            bail!("Layer has no field named `{}`", field);
        }

        Ok(self
            .features
            .iter()
            .filter_map(move |f| f.record.get(field)))
    }

    /// Calls `update` on every attribute row in order.
    pub fn update_rows<F>(&mut self, mut update: F) -> Result<()>
    where
        F: FnMut(&mut Record) -> Result<()>,
    {
        for feature in &mut self.features {
            update(&mut feature.record)?;
        }

        Ok(())
    }
}

/// Reads a numeric attribute as `f64`.
pub fn value_as_f64(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Numeric(v) => *v,
        FieldValue::Float(v) => v.map(f64::from),
        FieldValue::Double(v) => Some(*v),
        FieldValue::Integer(v) => Some(f64::from(*v)),
        _ => None,
    }
}

fn field_kind(name: &str, field_type: FieldType, length: u8, features: &[Feature]) -> Result<FieldKind> {
    let kind = match field_type {
        FieldType::Character => FieldKind::Character { length },
        FieldType::Numeric => FieldKind::Numeric {
            length,
            decimals: infer_decimals(name, length, features),
        },
        FieldType::Float => FieldKind::Float {
            length,
            decimals: infer_decimals(name, length, features),
        },
        FieldType::Integer => FieldKind::Integer,
        FieldType::Double => FieldKind::Double,
        FieldType::Logical => FieldKind::Logical,
        FieldType::Date => FieldKind::Date,
        other => bail!("Field `{}` has unsupported type {:?}", name, other),
    };

    Ok(kind)
}

// The decimal count is not exposed by the dbf reader, so keep integral
// columns integral and give fractional ones room.
fn infer_decimals(name: &str, length: u8, features: &[Feature]) -> u8 {
    let fractional = features
        .iter()
        .filter_map(|f| f.record.get(name))
        .filter_map(value_as_f64)
        .any(|v| v.fract() != 0.0);

    if fractional {
        length.saturating_sub(2).min(11)
    } else {
        0
    }
}

fn write_feature<W: Write + Seek>(writer: &mut shapefile::Writer<W>, feature: &Feature) -> Result<bool> {
    let record = &feature.record;
    match &feature.shape {
        Shape::NullShape => return Ok(false),
        Shape::Point(s) => writer.write_shape_and_record(s, record)?,
        Shape::PointM(s) => writer.write_shape_and_record(s, record)?,
        Shape::PointZ(s) => writer.write_shape_and_record(s, record)?,
        Shape::Polyline(s) => writer.write_shape_and_record(s, record)?,
        Shape::PolylineM(s) => writer.write_shape_and_record(s, record)?,
        Shape::PolylineZ(s) => writer.write_shape_and_record(s, record)?,
        Shape::Polygon(s) => writer.write_shape_and_record(s, record)?,
        Shape::PolygonM(s) => writer.write_shape_and_record(s, record)?,
        Shape::PolygonZ(s) => writer.write_shape_and_record(s, record)?,
        Shape::Multipoint(s) => writer.write_shape_and_record(s, record)?,
        Shape::MultipointM(s) => writer.write_shape_and_record(s, record)?,
        Shape::MultipointZ(s) => writer.write_shape_and_record(s, record)?,
        Shape::Multipatch(s) => writer.write_shape_and_record(s, record)?,
    }

    Ok(true)
}

// -- Tests -------------------------------------------------------------------
