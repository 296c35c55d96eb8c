#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    Float32(Vec<f32>),
    Uint8(Vec<u8>),
    Uint32(Vec<u32>),
}

impl AttributeData {
    fn len(&self) -> usize {
        match self {
            AttributeData::Float32(data) => data.len(),
            AttributeData::Uint8(data) => data.len(),
            AttributeData::Uint32(data) => data.len(),
        }
    }

    fn grow(&mut self, len: usize) {
        match self {
            AttributeData::Float32(data) => data.resize(len, 0.0),
            AttributeData::Uint8(data) => data.resize(len, 0),
            AttributeData::Uint32(data) => data.resize(len, 0),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttributeData::Float32(data) => bytemuck::cast_slice(data),
            AttributeData::Uint8(data) => data,
            AttributeData::Uint32(data) => bytemuck::cast_slice(data),
        }
    }

    fn element_size(&self) -> usize {
        match self {
            AttributeData::Float32(_) | AttributeData::Uint32(_) => 4,
            AttributeData::Uint8(_) => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DynamicAttribute {
    pub name: &'static str,
    /// Components per item, e.g. 3 for a position.
    pub item_size: usize,
    pub data: AttributeData,
}

/// Typed-array backed geometry whose arrays grow geometrically and never shrink. The draw
/// range tracks the item count of the latest `resize`.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicBufferGeometry {
    attributes: Vec<DynamicAttribute>,
    capacity: usize,
    item_count: usize,
    version: u64,
    allocations: u64,
}

impl Default for DynamicBufferGeometry {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicBufferGeometry {
    pub fn new() -> Self {
        Self {
            attributes: Vec::new(),
            capacity: 0,
            item_count: 0,
            version: 0,
            allocations: 0,
        }
    }

    /// Geometry with the position (3 x f32) and colour (4 x u8) layout used by points and lines.
    pub fn with_position_color() -> Self {
        let mut geometry = Self::new();
        geometry.create_attribute("position", AttributeData::Float32(Vec::new()), 3);
        geometry.create_attribute("color", AttributeData::Uint8(Vec::new()), 4);
        geometry
    }

    pub fn create_attribute(&mut self, name: &'static str, mut data: AttributeData, item_size: usize) {
        data.grow(self.capacity * item_size);
        self.attributes.retain(|attribute| attribute.name != name);
        self.attributes.push(DynamicAttribute {
            name,
            item_size,
            data,
        });
        self.version += 1;
    }

    pub fn attribute(&self, name: &str) -> Option<&DynamicAttribute> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    pub fn attributes(&self) -> &[DynamicAttribute] {
        &self.attributes
    }

    /// Sets the draw range to `count` items, growing every attribute when `count` exceeds the
    /// current capacity.
    pub fn resize(&mut self, count: usize) {
        if count > self.capacity {
            let capacity = count.max(self.capacity * 2);
            for attribute in &mut self.attributes {
                attribute.data.grow(capacity * attribute.item_size);
            }
            self.capacity = capacity;
            self.allocations += 1;
        }
        self.item_count = count;
        self.version += 1;
    }

    pub fn len(&self) -> usize {
        self.item_count
    }

    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of times the backing arrays have been reallocated.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Bumped on every mutation; GPU copies compare against it.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn mark_dirty(&mut self) {
        self.version += 1;
    }

    /// Mutable view over the float data of the whole capacity of `name`.
    pub fn float32_mut(&mut self, name: &str) -> Option<&mut [f32]> {
        self.version += 1;
        self.attributes
            .iter_mut()
            .find(|attribute| attribute.name == name)
            .and_then(|attribute| match &mut attribute.data {
                AttributeData::Float32(data) => Some(data.as_mut_slice()),
                _ => None,
            })
    }

    pub fn uint8_mut(&mut self, name: &str) -> Option<&mut [u8]> {
        self.version += 1;
        self.attributes
            .iter_mut()
            .find(|attribute| attribute.name == name)
            .and_then(|attribute| match &mut attribute.data {
                AttributeData::Uint8(data) => Some(data.as_mut_slice()),
                _ => None,
            })
    }

    pub fn float32(&self, name: &str) -> Option<&[f32]> {
        let attribute = self.attribute(name)?;
        match &attribute.data {
            AttributeData::Float32(data) => Some(&data[..self.item_count * attribute.item_size]),
            _ => None,
        }
    }

    pub fn uint8(&self, name: &str) -> Option<&[u8]> {
        let attribute = self.attribute(name)?;
        match &attribute.data {
            AttributeData::Uint8(data) => Some(&data[..self.item_count * attribute.item_size]),
            _ => None,
        }
    }

    /// Bytes of `name` inside the draw range.
    pub fn draw_range_bytes(&self, name: &str) -> Option<&[u8]> {
        let attribute = self.attribute(name)?;
        let len = self.item_count * attribute.item_size * attribute.data.element_size();
        Some(&attribute.data.as_bytes()[..len])
    }

    pub fn stride_of(&self, name: &str) -> Option<usize> {
        self.attribute(name)
            .map(|attribute| attribute.item_size * attribute.data.element_size())
    }

    /// Replaces the contents with `positions` and `colors`, one item per point.
    pub fn set_positions_colors(&mut self, positions: &[[f32; 3]], colors: &[[u8; 4]]) {
        let count = positions.len().min(colors.len());
        self.resize(count);
        if let Some(data) = self.float32_mut("position") {
            data[..count * 3].copy_from_slice(bytemuck::cast_slice(&positions[..count]));
        }
        if let Some(data) = self.uint8_mut("color") {
            data[..count * 4].copy_from_slice(bytemuck::cast_slice(&colors[..count]));
        }
    }

    pub fn capacity_items(&self) -> usize {
        self.attributes
            .first()
            .map(|attribute| attribute.data.len() / attribute.item_size.max(1))
            .unwrap_or(self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shrinking_keeps_allocation() {
        let mut geometry = DynamicBufferGeometry::with_position_color();
        geometry.resize(100);
        let allocations = geometry.allocations();
        geometry.resize(40);
        assert_eq!(geometry.allocations(), allocations);
        assert_eq!(geometry.capacity(), 100);
        assert_eq!(geometry.len(), 40);
        assert_eq!(geometry.float32("position").unwrap().len(), 120);
    }

    #[test]
    fn growing_preserves_data() {
        let mut geometry = DynamicBufferGeometry::with_position_color();
        geometry.set_positions_colors(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], &[[9, 8, 7, 6]; 2]);
        geometry.resize(3);
        assert_eq!(geometry.capacity(), 4);
        assert_eq!(
            &geometry.float32("position").unwrap()[..6],
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
        assert_eq!(&geometry.uint8("color").unwrap()[..4], &[9, 8, 7, 6]);
        assert_eq!(geometry.capacity_items(), 4);
    }

    #[test]
    fn growth_is_geometric() {
        let mut geometry = DynamicBufferGeometry::with_position_color();
        for count in 1..=1000 {
            geometry.resize(count);
        }
        assert!(geometry.allocations() <= 11);
        assert!(geometry.capacity() >= 1000);
    }

    #[test]
    fn versions_advance_on_mutation() {
        let mut geometry = DynamicBufferGeometry::with_position_color();
        let version = geometry.version();
        geometry.resize(1);
        assert!(geometry.version() > version);
        assert_eq!(geometry.draw_range_bytes("color").unwrap().len(), 4);
        assert_eq!(geometry.stride_of("position"), Some(12));
    }
}
