use crate::Result;
use crate::table::{Value, ValueRecord};
use crate::tsm::Shape;
use ohno::{IntoAppError, bail};

/// Marks the start of every persisted object.
const OBJECT_MAGIC: u32 = 0xBEBE_BEBE;

const VALUE_BOOL: u8 = 1;
const VALUE_INT: u8 = 2;
const VALUE_DOUBLE: u8 = 3;
const VALUE_STRING: u8 = 4;
const VALUE_DOUBLE_VEC: u8 = 5;

/// Writes typed values into an in-memory buffer in canonical (big-endian) form.
#[derive(Debug, Default)]
pub struct ObjectWriter {
    buffer: Vec<u8>,
}

impl ObjectWriter {
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Start a new object with the given type name and version.
    pub fn put_start(&mut self, type_name: &str, version: u32) -> Result<()> {
        self.put_u32(OBJECT_MAGIC);
        self.put_str(type_name)?;
        self.put_u32(version);
        Ok(())
    }

    #[inline]
    pub fn put_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    #[inline]
    pub fn put_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }

    #[inline]
    pub fn put_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    #[inline]
    pub fn put_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    #[inline]
    pub fn put_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    #[inline]
    pub fn put_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len).into_app_err_with(|| format!("length {len} does not fit in the stream format"))?;
        self.put_u32(len);
        Ok(())
    }

    pub fn put_str(&mut self, s: &str) -> Result<()> {
        self.put_len(s.len())?;
        self.buffer.extend_from_slice(s.as_bytes());
        Ok(())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_len(bytes.len())?;
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    pub fn put_shape(&mut self, shape: &Shape) -> Result<()> {
        self.put_len(shape.ndim())?;
        for &extent in shape.as_slice() {
            self.put_u64(extent);
        }
        Ok(())
    }

    pub fn put_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Bool(v) => {
                self.put_u8(VALUE_BOOL);
                self.put_bool(*v);
            }
            Value::Int(v) => {
                self.put_u8(VALUE_INT);
                self.put_i64(*v);
            }
            Value::Double(v) => {
                self.put_u8(VALUE_DOUBLE);
                self.put_f64(*v);
            }
            Value::String(v) => {
                self.put_u8(VALUE_STRING);
                self.put_str(v)?;
            }
            Value::DoubleVec(v) => {
                self.put_u8(VALUE_DOUBLE_VEC);
                self.put_len(v.len())?;
                for &x in v {
                    self.put_f64(x);
                }
            }
        }
        Ok(())
    }

    pub fn put_record(&mut self, record: &ValueRecord) -> Result<()> {
        self.put_len(record.len())?;
        for (name, value) in record {
            self.put_str(name)?;
            self.put_value(value)?;
        }
        Ok(())
    }
}

/// Reads values written by [`ObjectWriter`].
///
/// Every read is bounds-checked; running off the end of the data or finding
/// an unexpected tag is reported as an internal error since it means the
/// persisted data is corrupt.
#[derive(Debug)]
pub struct ObjectReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ObjectReader<'a> {
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let Some(end) = self.position.checked_add(n).filter(|&end| end <= self.data.len()) else {
            bail!(
                "internal error: stream truncated while reading {what} at offset {} (need {n} bytes, have {})",
                self.position,
                self.remaining()
            );
        };

        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N, what)?);
        Ok(buf)
    }

    /// Start reading an object, verifying its type name; returns the object version.
    pub fn get_start(&mut self, type_name: &str) -> Result<u32> {
        let magic = self.get_u32()?;
        if magic != OBJECT_MAGIC {
            bail!("internal error: expected object magic 0x{OBJECT_MAGIC:08X}, found 0x{magic:08X}");
        }

        let found = self.get_str()?;
        if found != type_name {
            bail!("internal error: expected object of type '{type_name}', found '{found}'");
        }

        self.get_u32()
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take_array::<1>("byte")?[0])
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take_array("u32")?))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take_array("u64")?))
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take_array("i64")?))
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take_array("f64")?))
    }

    pub fn get_len(&mut self) -> Result<usize> {
        let len = self.get_u32()?;
        usize::try_from(len).into_app_err("internal error: length does not fit in usize")
    }

    /// Read an element count, rejecting counts that cannot fit in the rest of the stream.
    pub fn get_count(&mut self, min_elem_size: usize, what: &str) -> Result<usize> {
        let offset = self.position;
        let count = self.get_len()?;
        if count.saturating_mul(min_elem_size.max(1)) > self.remaining() {
            bail!(
                "internal error: corrupt {what} count {count} at offset {offset} ({} bytes left in stream)",
                self.remaining()
            );
        }
        Ok(count)
    }

    pub fn get_str(&mut self) -> Result<&'a str> {
        let len = self.get_len()?;
        let bytes = self.take(len, "string")?;
        core::str::from_utf8(bytes).into_app_err("internal error: invalid UTF-8 in stream string")
    }

    pub fn get_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.get_len()?;
        self.take(len, "byte block")
    }

    pub fn get_shape(&mut self) -> Result<Shape> {
        let ndim = self.get_count(size_of::<u64>(), "shape")?;
        let mut extents = Vec::with_capacity(ndim);
        for _ in 0..ndim {
            extents.push(self.get_u64()?);
        }
        Ok(Shape::new(extents))
    }

    pub fn get_value(&mut self) -> Result<Value> {
        let tag = self.get_u8()?;
        let value = match tag {
            VALUE_BOOL => Value::Bool(self.get_bool()?),
            VALUE_INT => Value::Int(self.get_i64()?),
            VALUE_DOUBLE => Value::Double(self.get_f64()?),
            VALUE_STRING => Value::String(self.get_str()?.to_string()),
            VALUE_DOUBLE_VEC => {
                let len = self.get_count(size_of::<f64>(), "vector")?;
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(self.get_f64()?);
                }
                Value::DoubleVec(v)
            }
            _ => bail!("internal error: unknown value tag {tag} at offset {}", self.position - 1),
        };
        Ok(value)
    }

    pub fn get_record(&mut self) -> Result<ValueRecord> {
        let count = self.get_len()?;
        let mut record = ValueRecord::new();
        for _ in 0..count {
            let name = self.get_str()?.to_string();
            let value = self.get_value()?;
            let _ = record.insert(name, value);
        }
        Ok(record)
    }
}
