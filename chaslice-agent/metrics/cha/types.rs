// Four-axis table of raw CHA counts: run x socket x box x event

/// Dimensions of a [`CountsTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableShape {
    pub runs: usize,
    pub sockets: usize,
    pub boxes: usize,
    pub events: usize,
}

impl TableShape {
    pub fn len(&self) -> usize {
        self.runs * self.sockets * self.boxes * self.events
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn index(&self, run: usize, socket: usize, cha: usize, event: usize) -> Option<usize> {
        if run >= self.runs || socket >= self.sockets || cha >= self.boxes || event >= self.events
        {
            return None;
        }
        Some(((run * self.sockets + socket) * self.boxes + cha) * self.events + event)
    }
}

/// Dense counts table, zeroed on creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountsTable {
    shape: TableShape,
    data: Vec<u64>,
}

impl CountsTable {
    pub fn new(runs: usize, sockets: usize, boxes: usize, events: usize) -> Self {
        Self::with_shape(TableShape {
            runs,
            sockets,
            boxes,
            events,
        })
    }

    pub fn with_shape(shape: TableShape) -> Self {
        Self {
            shape,
            data: vec![0; shape.len()],
        }
    }

    pub fn shape(&self) -> TableShape {
        self.shape
    }

    pub fn get(&self, run: usize, socket: usize, cha: usize, event: usize) -> Option<u64> {
        self.shape
            .index(run, socket, cha, event)
            .map(|i| self.data[i])
    }

    /// Store a count; out-of-range coordinates are ignored and reported
    /// as `false`.
    pub fn set(&mut self, run: usize, socket: usize, cha: usize, event: usize, value: u64) -> bool {
        match self.shape.index(run, socket, cha, event) {
            Some(i) => {
                self.data[i] = value;
                true
            }
            None => false,
        }
    }

    /// Values of one `(socket, box, event)` cell across every run
    pub fn runs_of(&self, socket: usize, cha: usize, event: usize) -> Vec<u64> {
        (0..self.shape.runs)
            .filter_map(|run| self.get(run, socket, cha, event))
            .collect()
    }

    pub(crate) fn raw(&self) -> &[u64] {
        &self.data
    }

    pub(crate) fn from_raw(shape: TableShape, data: Vec<u64>) -> Self {
        debug_assert_eq!(shape.len(), data.len());
        Self { shape, data }
    }
}
