#[derive(Debug, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    input: TestInput,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, input: TestInput) -> Self {
        Self { name, group, input }
    }

    pub fn small(name: &'static str, input: TestInput) -> Self {
        Self::new(name, TestGroup::Small, input)
    }

    pub fn normal(name: &'static str, input: TestInput) -> Self {
        Self::new(name, TestGroup::Normal, input)
    }

    pub fn large(name: &'static str, input: TestInput) -> Self {
        Self::new(name, TestGroup::Large, input)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn input(&self) -> &TestInput {
        &self.input
    }
}

/// Wire bytes fed to a decoder, along with the number of frames they hold.
#[derive(Debug, Clone)]
pub struct TestInput {
    bytes: Vec<u8>,
    frame_count: usize,
}

impl TestInput {
    pub fn new(bytes: Vec<u8>, frame_count: usize) -> Self {
        Self { bytes, frame_count }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}
