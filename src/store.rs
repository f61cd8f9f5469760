//! The dataset store: single-writer owner of all loaded and derived state.
//!
//! All mutations go through the store's entry points (load, column refresh,
//! filter / selection / highlight mutation). Reactions to a change are
//! applied synchronously in dependency order (data, then the filtered mask,
//! then stats, then colors, then the relevance trigger), and every derived
//! value is replaced wholesale as an immutable `Arc` snapshot, then
//! broadcast once on the injected change bus.
//!
//! The relevance computation is the only background work: the scorer runs
//! on a blocking worker and its completion re-enters the store through a
//! channel, guarded by the coordinator's generation check.

use crate::bus::{ChangeBus, SubscriptionId};
use crate::colors::{build_transfer_functions, ColumnColors, Palette};
use crate::column::{Column, ColumnBuffer};
use crate::dataset::Dataset;
use crate::error::{FilterEvaluationError, StoreError};
use crate::filter::{Filter, FilterKind};
use crate::mask::{compute_filtered_mask, RowMask};
use crate::relevance::{
    ColumnRelevance, Completion, RelevanceCoordinator, RelevanceInputs, RelevanceScorer,
};
use crate::stats::{compute_stats, StatsMap};
use crate::transport::{DataTransport, Issue, Notification};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Named pieces of derived state external parties can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Loading,
    LoadingError,
    Columns,
    ColumnData,
    Filters,
    FilteredMask,
    SelectedMask,
    HighlightedMask,
    FullStats,
    FilteredStats,
    SelectedStats,
    ColorMaps,
    Relevance,
    Issues,
    Sort,
    FocusedRow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortState {
    pub column: String,
    pub direction: SortDirection,
}

/// A state change, carrying the new value as an immutable snapshot.
#[derive(Debug, Clone)]
pub enum StoreUpdate {
    Loading(bool),
    LoadingError(Option<String>),
    Columns(Arc<Vec<Column>>),
    /// Keys whose buffers were replaced.
    ColumnData { keys: Vec<String> },
    /// Current filter ids, in display order.
    Filters { ids: Vec<u64> },
    /// A filter failed during evaluation and was removed.
    FilterRemoved {
        filter_id: u64,
        error: FilterEvaluationError,
    },
    FilteredMask(Arc<RowMask>),
    SelectedMask(Arc<RowMask>),
    HighlightedMask(Arc<RowMask>),
    FullStats(Arc<StatsMap>),
    FilteredStats(Arc<StatsMap>),
    SelectedStats(Arc<StatsMap>),
    ColorMaps(Arc<HashMap<String, ColumnColors>>),
    /// `None` when a reload invalidated the previous result and the fresh
    /// one has not landed yet.
    Relevance(Option<Arc<ColumnRelevance>>),
    Issues {
        issues: Arc<Vec<Issue>>,
        running: bool,
    },
    Sort(Option<SortState>),
    FocusedRow(Option<usize>),
}

impl StoreUpdate {
    pub fn topic(&self) -> Topic {
        match self {
            StoreUpdate::Loading(_) => Topic::Loading,
            StoreUpdate::LoadingError(_) => Topic::LoadingError,
            StoreUpdate::Columns(_) => Topic::Columns,
            StoreUpdate::ColumnData { .. } => Topic::ColumnData,
            StoreUpdate::Filters { .. } | StoreUpdate::FilterRemoved { .. } => Topic::Filters,
            StoreUpdate::FilteredMask(_) => Topic::FilteredMask,
            StoreUpdate::SelectedMask(_) => Topic::SelectedMask,
            StoreUpdate::HighlightedMask(_) => Topic::HighlightedMask,
            StoreUpdate::FullStats(_) => Topic::FullStats,
            StoreUpdate::FilteredStats(_) => Topic::FilteredStats,
            StoreUpdate::SelectedStats(_) => Topic::SelectedStats,
            StoreUpdate::ColorMaps(_) => Topic::ColorMaps,
            StoreUpdate::Relevance(_) => Topic::Relevance,
            StoreUpdate::Issues { .. } => Topic::Issues,
            StoreUpdate::Sort(_) => Topic::Sort,
            StoreUpdate::FocusedRow(_) => Topic::FocusedRow,
        }
    }
}

/// Result of one finished relevance computation, sent back to the store.
#[derive(Debug)]
pub struct RelevanceCompletion {
    pub dataset_generation: u64,
    pub request_generation: u64,
    pub scores: HashMap<String, f64>,
}

pub struct DatasetStore<T, S>
where
    T: DataTransport,
    S: RelevanceScorer + 'static,
{
    transport: T,
    scorer: Arc<S>,
    bus: ChangeBus<Topic, StoreUpdate>,
    palette: Palette,

    dataset: Dataset,
    filters: Vec<Filter>,
    next_filter_id: u64,

    filtered: Arc<RowMask>,
    selected: Arc<RowMask>,
    highlighted: Arc<RowMask>,

    full_stats: Arc<StatsMap>,
    filtered_stats: Arc<StatsMap>,
    selected_stats: Arc<StatsMap>,
    color_maps: Arc<HashMap<String, ColumnColors>>,

    issues: Arc<Vec<Issue>>,
    issues_running: bool,

    relevance: RelevanceCoordinator,
    current_relevance: Option<Arc<ColumnRelevance>>,

    sort: Option<SortState>,
    focused_row: Option<usize>,

    loading: bool,
    loading_error: Option<StoreError>,

    completion_tx: mpsc::UnboundedSender<RelevanceCompletion>,
    completion_rx: mpsc::UnboundedReceiver<RelevanceCompletion>,
}

impl<T, S> DatasetStore<T, S>
where
    T: DataTransport,
    S: RelevanceScorer + 'static,
{
    /// Construct the store with its collaborators injected. The bus is
    /// created by the initializer so all wiring is explicit.
    pub fn new(transport: T, scorer: S, bus: ChangeBus<Topic, StoreUpdate>) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        DatasetStore {
            transport,
            scorer: Arc::new(scorer),
            bus,
            palette: Palette::default(),
            dataset: Dataset::empty(),
            filters: Vec::new(),
            next_filter_id: 0,
            filtered: Arc::new(RowMask::all_true(0)),
            selected: Arc::new(RowMask::all_false(0)),
            highlighted: Arc::new(RowMask::all_false(0)),
            full_stats: Arc::new(StatsMap::new()),
            filtered_stats: Arc::new(StatsMap::new()),
            selected_stats: Arc::new(StatsMap::new()),
            color_maps: Arc::new(HashMap::new()),
            issues: Arc::new(Vec::new()),
            issues_running: false,
            relevance: RelevanceCoordinator::new(),
            current_relevance: None,
            sort: None,
            focused_row: None,
            loading: false,
            loading_error: None,
            completion_tx,
            completion_rx,
        }
    }

    // ---- subscriptions -------------------------------------------------

    pub fn subscribe(
        &mut self,
        topic: Topic,
        callback: impl Fn(&StoreUpdate) + 'static,
    ) -> SubscriptionId {
        self.bus.subscribe(topic, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    fn publish(&self, update: StoreUpdate) {
        self.bus.publish(update.topic(), &update);
    }

    // ---- loading -------------------------------------------------------

    /// Full dataset load. On success the previous dataset, filters,
    /// selection and highlighting are replaced/reset and the generation is
    /// bumped; on failure the store keeps its last good state and exposes
    /// the error via `loading_error`.
    pub async fn fetch(&mut self) {
        self.set_loading(true);
        match self.transport.fetch_table().await {
            Ok(descriptor) => self.install_dataset(descriptor),
            Err(err) => self.set_loading_error(err.into()),
        }
        self.set_loading(false);
    }

    /// Full reload triggered by the backend's `refresh` notification.
    pub async fn refresh(&mut self) {
        info!("refreshing dataset '{}'", self.dataset.uid);
        self.fetch().await;
    }

    /// Ask the backend to open another table file, then load it.
    pub async fn open_table(&mut self, path: &str) {
        match self.transport.open_table(path).await {
            Ok(()) => self.fetch().await,
            Err(err) => self.set_loading_error(err.into()),
        }
    }

    fn install_dataset(&mut self, descriptor: crate::transport::TableDescriptor) {
        let next_generation = self.dataset.generation_id + 1;
        let dataset = match Dataset::materialize(descriptor, next_generation) {
            Ok(dataset) => dataset,
            Err(err) => {
                self.set_loading_error(err.into());
                return;
            }
        };

        info!(
            "loaded dataset '{}' generation {} ({} rows, {} columns)",
            dataset.uid,
            dataset.generation_id,
            dataset.row_count,
            dataset.columns.len()
        );

        let row_count = dataset.row_count;
        self.dataset = dataset;

        // A full reload resets filters, selection and highlighting; any
        // in-flight relevance result is now keyed to a dead generation.
        self.filters.clear();
        self.selected = Arc::new(RowMask::all_false(row_count));
        self.highlighted = Arc::new(RowMask::all_false(row_count));
        self.relevance.reset();
        if self.current_relevance.take().is_some() {
            self.publish(StoreUpdate::Relevance(None));
        }

        self.publish(StoreUpdate::Columns(Arc::new(self.dataset.columns.clone())));
        let keys: Vec<String> = self.dataset.column_data.keys().cloned().collect();
        self.publish(StoreUpdate::ColumnData { keys });
        self.publish_filters();
        self.publish(StoreUpdate::SelectedMask(self.selected.clone()));
        self.publish(StoreUpdate::HighlightedMask(self.highlighted.clone()));

        self.react_to_data_change();
    }

    /// Re-fetch one column's values (push notification `columnsUpdated`).
    /// Filters, selection and highlighting persist across this.
    pub async fn refetch_column_values(&mut self, key: &str) {
        let generation = self.dataset.generation_id;
        match self.transport.fetch_column(key, generation).await {
            Ok(values) => {
                if let Err(err) = self.dataset.replace_column_values(key, &values) {
                    self.set_loading_error(err.into());
                    return;
                }
                self.publish(StoreUpdate::ColumnData {
                    keys: vec![key.to_string()],
                });
                self.react_to_data_change();
            }
            Err(err) => self.set_loading_error(err.into()),
        }
    }

    /// Fetch the current issue report from the analysis process.
    pub async fn fetch_issues(&mut self) {
        match self.transport.fetch_issues().await {
            Ok(report) => {
                self.issues = Arc::new(report.issues);
                self.issues_running = report.running;
                self.publish(StoreUpdate::Issues {
                    issues: self.issues.clone(),
                    running: self.issues_running,
                });
            }
            // Issues are an auxiliary annotation; a failed fetch does not
            // disturb the loaded dataset.
            Err(err) => warn!("issue fetch failed: {}", err),
        }
    }

    /// Dispatch one inbound push notification to its entry point.
    pub async fn handle_notification(&mut self, notification: Notification) {
        match notification {
            Notification::Refresh => self.refresh().await,
            Notification::IssuesUpdated => self.fetch_issues().await,
            Notification::ColumnsUpdated { keys } => {
                for key in keys {
                    self.refetch_column_values(&key).await;
                }
            }
        }
    }

    fn set_loading(&mut self, loading: bool) {
        if self.loading != loading {
            self.loading = loading;
            self.publish(StoreUpdate::Loading(loading));
        }
    }

    fn set_loading_error(&mut self, err: StoreError) {
        error!("load failed: {}", err);
        self.publish(StoreUpdate::LoadingError(Some(err.to_string())));
        self.loading_error = Some(err);
    }

    pub fn clear_loading_error(&mut self) {
        if self.loading_error.take().is_some() {
            self.publish(StoreUpdate::LoadingError(None));
        }
    }

    // ---- filters -------------------------------------------------------

    /// Append a filter; returns its id. Insertion order is preserved for
    /// display.
    pub fn add_filter(&mut self, kind: FilterKind) -> u64 {
        let id = self.next_filter_id;
        self.next_filter_id += 1;
        self.filters.push(Filter::new(id, kind));
        self.publish_filters();
        self.react_to_filter_change();
        id
    }

    pub fn remove_filter(&mut self, id: u64) -> bool {
        let before = self.filters.len();
        self.filters.retain(|f| f.id != id);
        if self.filters.len() == before {
            return false;
        }
        self.publish_filters();
        self.react_to_filter_change();
        true
    }

    pub fn toggle_filter_enabled(&mut self, id: u64) -> bool {
        let Some(filter) = self.filters.iter_mut().find(|f| f.id == id) else {
            return false;
        };
        filter.is_enabled = !filter.is_enabled;
        self.publish_filters();
        self.react_to_filter_change();
        true
    }

    /// Swap a filter's predicate in place, keeping its id, position and
    /// enabled/inverted flags.
    pub fn replace_filter(&mut self, id: u64, kind: FilterKind) -> bool {
        let Some(filter) = self.filters.iter_mut().find(|f| f.id == id) else {
            return false;
        };
        filter.kind = kind;
        self.publish_filters();
        self.react_to_filter_change();
        true
    }

    pub fn set_filter_inverted(&mut self, id: u64, inverted: bool) -> bool {
        let Some(filter) = self.filters.iter_mut().find(|f| f.id == id) else {
            return false;
        };
        if filter.is_inverted == inverted {
            return true;
        }
        filter.is_inverted = inverted;
        self.publish_filters();
        self.react_to_filter_change();
        true
    }

    fn publish_filters(&self) {
        self.publish(StoreUpdate::Filters {
            ids: self.filters.iter().map(|f| f.id).collect(),
        });
    }

    // ---- selection & highlighting -------------------------------------

    /// Replace the selection with a dense mask (padded/truncated to the
    /// row count).
    pub fn select_rows(&mut self, mask: Vec<bool>) {
        let mut mask = mask;
        mask.resize(self.dataset.row_count, false);
        self.selected = Arc::new(RowMask::from_mask(mask));
        self.publish(StoreUpdate::SelectedMask(self.selected.clone()));
        self.recompute_selected_stats();
        self.trigger_relevance();
    }

    /// Highlight one row. With `exclusive`, all other highlights are
    /// cleared first. A no-op (no notification) when the requested state
    /// already holds.
    pub fn highlight_row_at(&mut self, row: usize, exclusive: bool) {
        let updated = if exclusive {
            if row >= self.dataset.row_count
                || (self.highlighted.count() == 1 && self.highlighted.get(row))
            {
                None
            } else {
                Some(RowMask::from_indices(&[row], self.dataset.row_count))
            }
        } else {
            self.highlighted.with_bit(row, true)
        };

        if let Some(mask) = updated {
            self.set_highlighted(mask);
        }
    }

    pub fn dehighlight_row_at(&mut self, row: usize) {
        if let Some(mask) = self.highlighted.with_bit(row, false) {
            self.set_highlighted(mask);
        }
    }

    pub fn dehighlight_all(&mut self) {
        if self.highlighted.count() > 0 {
            self.set_highlighted(RowMask::all_false(self.dataset.row_count));
        }
    }

    pub fn set_highlighted_rows(&mut self, rows: &[usize]) {
        let mask = RowMask::from_indices(rows, self.dataset.row_count);
        if mask != *self.highlighted {
            self.set_highlighted(mask);
        }
    }

    fn set_highlighted(&mut self, mask: RowMask) {
        self.highlighted = Arc::new(mask);
        self.publish(StoreUpdate::HighlightedMask(self.highlighted.clone()));
    }

    // ---- display state -------------------------------------------------

    pub fn sort_by(&mut self, column: Option<&str>, direction: SortDirection) {
        let sort = column.map(|column| SortState {
            column: column.to_string(),
            direction,
        });
        if sort != self.sort {
            self.sort = sort;
            self.publish(StoreUpdate::Sort(self.sort.clone()));
        }
    }

    pub fn focus_row(&mut self, row: Option<usize>) {
        if row != self.focused_row {
            self.focused_row = row;
            self.publish(StoreUpdate::FocusedRow(row));
        }
    }

    /// Swap the external color palette; rebuilds all transfer functions.
    pub fn set_palette(&mut self, palette: Palette) {
        if palette != self.palette {
            self.palette = palette;
            self.recompute_colors();
        }
    }

    // ---- reactions -----------------------------------------------------

    fn react_to_data_change(&mut self) {
        self.apply_filters();
        self.recompute_full_stats();
        self.recompute_filtered_stats();
        self.recompute_selected_stats();
        self.recompute_colors();
        self.trigger_relevance();
    }

    fn react_to_filter_change(&mut self) {
        self.apply_filters();
        self.recompute_filtered_stats();
        self.recompute_colors();
        self.trigger_relevance();
    }

    fn apply_filters(&mut self) {
        let (mask, failures) = compute_filtered_mask(
            &self.filters,
            &self.dataset.column_data,
            self.dataset.row_count,
        );

        if !failures.is_empty() {
            for failure in &failures {
                warn!("removing filter {}: {}", failure.filter_id, failure.error);
                self.filters.retain(|f| f.id != failure.filter_id);
            }
            for failure in failures {
                self.publish(StoreUpdate::FilterRemoved {
                    filter_id: failure.filter_id,
                    error: failure.error,
                });
            }
            self.publish_filters();
        }

        self.filtered = Arc::new(mask);
        self.publish(StoreUpdate::FilteredMask(self.filtered.clone()));
    }

    fn recompute_full_stats(&mut self) {
        self.full_stats = Arc::new(compute_stats(
            &self.dataset.columns,
            &self.dataset.column_data,
            None,
        ));
        self.publish(StoreUpdate::FullStats(self.full_stats.clone()));
    }

    fn recompute_filtered_stats(&mut self) {
        self.filtered_stats = Arc::new(compute_stats(
            &self.dataset.columns,
            &self.dataset.column_data,
            Some(&self.filtered),
        ));
        self.publish(StoreUpdate::FilteredStats(self.filtered_stats.clone()));
    }

    fn recompute_selected_stats(&mut self) {
        self.selected_stats = Arc::new(compute_stats(
            &self.dataset.columns,
            &self.dataset.column_data,
            Some(&self.selected),
        ));
        self.publish(StoreUpdate::SelectedStats(self.selected_stats.clone()));
    }

    fn recompute_colors(&mut self) {
        self.color_maps = Arc::new(build_transfer_functions(
            &self.dataset.columns,
            &self.dataset.column_data,
            self.filtered.indices(),
            &self.palette,
        ));
        self.publish(StoreUpdate::ColorMaps(self.color_maps.clone()));
    }

    // ---- relevance -----------------------------------------------------

    fn trigger_relevance(&mut self) {
        if self.relevance.trigger() {
            self.spawn_relevance();
        }
    }

    fn spawn_relevance(&self) {
        let request_generation = self.relevance.request_generation();
        let dataset_generation = self.dataset.generation_id;
        let inputs = RelevanceInputs {
            columns: self.dataset.columns.clone(),
            column_data: self.dataset.column_data.clone(),
            selected_indices: self.selected.indices().to_vec(),
            filtered_indices: self.filtered.indices().to_vec(),
        };
        let scorer = Arc::clone(&self.scorer);
        let tx = self.completion_tx.clone();

        debug!(
            "starting relevance computation, request generation {}",
            request_generation
        );
        tokio::task::spawn_blocking(move || {
            let scores = scorer.score(&inputs);
            // The store may be gone by the time we finish; nothing to do then.
            let _ = tx.send(RelevanceCompletion {
                dataset_generation,
                request_generation,
                scores,
            });
        });
    }

    /// Apply one finished computation. A result from a previous dataset
    /// generation is dropped outright; a result superseded by newer
    /// triggers is discarded and the computation restarted against current
    /// inputs. Only a result matching the latest request is published.
    pub fn handle_relevance_completion(&mut self, completion: RelevanceCompletion) {
        if completion.dataset_generation != self.dataset.generation_id {
            debug!(
                "dropping relevance result for stale dataset generation {}",
                completion.dataset_generation
            );
            return;
        }

        match self.relevance.on_complete(completion.request_generation) {
            Completion::Publish => {
                let result = Arc::new(ColumnRelevance {
                    generation: completion.request_generation,
                    scores: completion.scores,
                });
                self.current_relevance = Some(result.clone());
                self.publish(StoreUpdate::Relevance(Some(result)));
            }
            Completion::Restart => {
                debug!(
                    "relevance result for generation {} superseded, restarting",
                    completion.request_generation
                );
                self.spawn_relevance();
            }
        }
    }

    /// Wait for the next background completion and apply it. Callers drive
    /// this from their event loop.
    pub async fn process_next_completion(&mut self) {
        if let Some(completion) = self.completion_rx.recv().await {
            self.handle_relevance_completion(completion);
        }
    }

    /// Apply all completions that have already arrived, without waiting.
    pub fn try_process_completions(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.handle_relevance_completion(completion);
            processed += 1;
        }
        processed
    }

    // ---- read accessors ------------------------------------------------

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn columns(&self) -> &[Column] {
        &self.dataset.columns
    }

    pub fn column_data(&self) -> &HashMap<String, Arc<ColumnBuffer>> {
        &self.dataset.column_data
    }

    pub fn generation_id(&self) -> u64 {
        self.dataset.generation_id
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn filtered(&self) -> &RowMask {
        &self.filtered
    }

    pub fn selected(&self) -> &RowMask {
        &self.selected
    }

    pub fn highlighted(&self) -> &RowMask {
        &self.highlighted
    }

    pub fn full_stats(&self) -> &StatsMap {
        &self.full_stats
    }

    pub fn filtered_stats(&self) -> &StatsMap {
        &self.filtered_stats
    }

    pub fn selected_stats(&self) -> &StatsMap {
        &self.selected_stats
    }

    pub fn color_maps(&self) -> &HashMap<String, ColumnColors> {
        &self.color_maps
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn issues_running(&self) -> bool {
        self.issues_running
    }

    pub fn relevance(&self) -> Option<&ColumnRelevance> {
        self.current_relevance.as_deref()
    }

    pub fn is_computing_relevance(&self) -> bool {
        self.relevance.is_computing()
    }

    pub fn sort(&self) -> Option<&SortState> {
        self.sort.as_ref()
    }

    pub fn focused_row(&self) -> Option<usize> {
        self.focused_row
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn loading_error(&self) -> Option<&StoreError> {
        self.loading_error.as_ref()
    }
}
