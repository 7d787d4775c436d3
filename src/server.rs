use crate::config::{AppConfig, MapConfig};
use crate::export::to_feature_collection;
use crate::map::{LoggingSelection, SelectionSink};
use crate::types::{MarkerDescriptor, Projection, RoleBinding};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use geojson::FeatureCollection;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

// Wrapper for RTree indexing
pub struct MarkerIndex {
    index: usize,
    point: [f64; 2],
}

impl RTreeObject for MarkerIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for MarkerIndex {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

pub struct AppState {
    pub markers: Vec<MarkerDescriptor>,
    pub features: FeatureCollection,
    pub tree: RTree<MarkerIndex>,
    pub selection: Option<RoleBinding>,
    pub sink: Box<dyn SelectionSink + Send + Sync>,
}

impl AppState {
    pub fn new(
        projection: Projection,
        tiles: &MapConfig,
        selection: Option<RoleBinding>,
        sink: Box<dyn SelectionSink + Send + Sync>,
    ) -> Self {
        let tree_items: Vec<MarkerIndex> = projection
            .markers
            .iter()
            .enumerate()
            .map(|(i, marker)| MarkerIndex {
                index: i,
                point: [marker.lon(), marker.lat()],
            })
            .collect();

        Self {
            features: to_feature_collection(&projection, tiles),
            tree: RTree::bulk_load(tree_items),
            markers: projection.markers,
            selection,
            sink,
        }
    }
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct QueryResponse {
    row: usize,
    lat: f64,
    lon: f64,
    popup: String,
}

#[derive(Deserialize)]
pub struct SelectionRequest {
    rows: Vec<usize>,
}

pub fn router(state: Arc<AppState>, static_dir: &std::path::Path) -> Router {
    Router::new()
        .route("/api/markers", get(markers_handler))
        .route("/api/query", get(query_handler))
        .route("/api/selection", post(selection_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(
    config: AppConfig,
    projection: Projection,
    selection: Option<RoleBinding>,
) -> Result<()> {
    info!("Building spatial index for {} markers...", projection.markers.len());
    let state = Arc::new(AppState::new(
        projection,
        &config.map,
        selection,
        Box::new(LoggingSelection),
    ));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let app = router(state, &config.server.static_dir);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn markers_handler(State(state): State<Arc<AppState>>) -> Json<FeatureCollection> {
    Json(state.features.clone())
}

/// Marker nearest to the queried coordinate.
async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<QueryResponse>> {
    let nearest = state
        .tree
        .nearest_neighbor(&[params.lon, params.lat])
        .and_then(|candidate| state.markers.get(candidate.index));

    Json(nearest.map(|marker| QueryResponse {
        row: marker.row_index,
        lat: marker.lat(),
        lon: marker.lon(),
        popup: marker.popup.to_html(),
    }))
}

async fn selection_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SelectionRequest>,
) -> StatusCode {
    state.sink.post_selection(state.selection.as_ref(), &request.rows);
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{project_markers, DisplayOptions};
    use crate::types::{Roles, Row, Value};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Captured(Arc<Mutex<Vec<Vec<usize>>>>);

    impl SelectionSink for Captured {
        fn post_selection(&self, _role: Option<&RoleBinding>, rows: &[usize]) {
            self.0.lock().unwrap().push(rows.to_vec());
        }
    }

    fn state(sink: Box<dyn SelectionSink + Send + Sync>) -> Arc<AppState> {
        let roles = Roles {
            latitude: Some(RoleBinding::new("lat", "Latitude")),
            longitude: Some(RoleBinding::new("lon", "Longitude")),
            location: Some(RoleBinding::new("name", "Name")),
            ..Roles::default()
        };
        let rows: Vec<Row> = vec![
            [("lat", Value::from("?")), ("lon", Value::from("?")), ("name", Value::from("lost"))]
                .into_iter()
                .collect(),
            [("lat", Value::Number(53.35)), ("lon", Value::Number(-6.26)), ("name", Value::from("Dublin"))]
                .into_iter()
                .collect(),
            [("lat", Value::Number(51.9)), ("lon", Value::Number(-8.47)), ("name", Value::from("Cork"))]
                .into_iter()
                .collect(),
        ];
        let projection = project_markers(&rows, &roles, &DisplayOptions::default());
        Arc::new(AppState::new(projection, &MapConfig::default(), None, sink))
    }

    #[tokio::test]
    async fn query_returns_nearest_marker() {
        let state = state(Box::new(LoggingSelection));
        let Json(response) = query_handler(
            State(state),
            Query(QueryParams { lat: 52.0, lon: -8.0 }),
        )
        .await;

        let response = response.unwrap();
        assert_eq!(response.row, 2);
        assert_eq!(response.popup, "<b>Cork</b>");
    }

    #[tokio::test]
    async fn query_on_empty_map_is_null() {
        let state = Arc::new(AppState::new(
            Projection::default(),
            &MapConfig::default(),
            None,
            Box::new(LoggingSelection),
        ));
        let Json(response) = query_handler(State(state), Query(QueryParams { lat: 0.0, lon: 0.0 })).await;
        assert_eq!(response, None);
    }

    #[tokio::test]
    async fn markers_endpoint_serves_features() {
        let Json(collection) = markers_handler(State(state(Box::new(LoggingSelection)))).await;
        assert_eq!(collection.features.len(), 2);
    }

    #[tokio::test]
    async fn selection_is_forwarded() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let state = state(Box::new(Captured(captured.clone())));

        let status = selection_handler(State(state), Json(SelectionRequest { rows: vec![1] })).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(*captured.lock().unwrap(), vec![vec![1]]);
    }
}
