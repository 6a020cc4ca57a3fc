//! The single-page dashboard served at `/`.

use axum::response::Html;

pub async fn index() -> Html<&'static str> {
    Html(PAGE)
}

const PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Crypto Portfolio Dashboard</title>
<style>
  body { margin: 0; font-family: system-ui, sans-serif; background: #0f172a; color: #e2e8f0; }
  header, main { max-width: 1100px; margin: 0 auto; padding: 1rem; }
  .bar { display: flex; justify-content: space-between; align-items: center;
         padding: .75rem; background: #1e293b; border: 1px solid #334155; border-radius: 8px; }
  .muted { color: #94a3b8; font-size: .875rem; }
  button { padding: .5rem 1rem; background: #2563eb; color: #fff; border: 0; border-radius: 6px; cursor: pointer; }
  button:disabled { background: #475569; cursor: default; }
  .grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(480px, 1fr)); gap: 1rem; margin-top: 1rem; }
  figure { margin: 0; padding: .75rem; background: #1e293b; border-radius: 8px; }
  figure img { width: 100%; background: #fff; border-radius: 4px; }
  #message { margin-top: .5rem; white-space: pre-wrap; }
  a { color: #60a5fa; }
</style>
</head>
<body>
<header>
  <h1>Crypto Portfolio Dashboard</h1>
  <div class="bar">
    <span class="muted">Last updated: <span id="last-updated">never</span></span>
    <button id="update">Update Data</button>
  </div>
  <div id="message" class="muted"></div>
</header>
<main>
  <section class="grid">
    <figure><img src="/reports/cumulative_returns.svg" alt="Portfolio cumulative returns" onerror="this.parentElement.style.display='none'"></figure>
    <figure><img src="/reports/portfolio_drawdown.svg" alt="Portfolio drawdown" onerror="this.parentElement.style.display='none'"></figure>
    <figure><img src="/reports/return_distribution.svg" alt="Daily returns distribution" onerror="this.parentElement.style.display='none'"></figure>
    <figure><img src="/reports/correlation_matrix.svg" alt="Asset correlation matrix" onerror="this.parentElement.style.display='none'"></figure>
    <figure><img src="/reports/strategy_weights.svg" alt="Strategy weights comparison" onerror="this.parentElement.style.display='none'"></figure>
    <figure><img src="/reports/efficient_frontier.png" alt="Efficient frontier" onerror="this.parentElement.style.display='none'"></figure>
    <figure><img src="/reports/rolling_sharpe.png" alt="Rolling Sharpe ratio" onerror="this.parentElement.style.display='none'"></figure>
    <figure><img src="/reports/monthly_heatmap.png" alt="Monthly returns heatmap" onerror="this.parentElement.style.display='none'"></figure>
  </section>
  <h2>Reports</h2>
  <section class="grid">
    <figure><img src="/reports/portfolio_analysis.png" alt="Portfolio analysis" onerror="this.parentElement.style.display='none'"></figure>
    <figure><img src="/reports/portfolio_optimization_comparison.png" alt="Optimization strategy comparison" onerror="this.parentElement.style.display='none'"></figure>
    <figure><img src="/reports/performance_comparison.png" alt="Performance comparison" onerror="this.parentElement.style.display='none'"></figure>
  </section>
  <p><a href="/reports/portfolio_report.html" target="_blank" rel="noopener">Full portfolio report</a></p>
</main>
<script>
  const button = document.getElementById('update');
  const message = document.getElementById('message');
  const lastUpdated = document.getElementById('last-updated');

  async function loadStatus() {
    try {
      const res = await fetch('/api/status');
      const body = await res.json();
      const data = body.data || {};
      if (data.last_success) {
        lastUpdated.textContent = new Date(data.last_success).toLocaleString();
      }
      if (data.running) {
        button.disabled = true;
        button.textContent = 'Updating...';
      }
    } catch (e) {
      console.log('status unavailable', e);
    }
  }

  button.addEventListener('click', async () => {
    button.disabled = true;
    button.textContent = 'Updating...';
    message.textContent = '';
    try {
      const res = await fetch('/api/update-data', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' }
      });
      const body = await res.json();
      if (res.ok) {
        window.location.reload();
        return;
      }
      message.textContent = body.message || body.error || 'Data update failed';
    } catch (e) {
      message.textContent = 'Data update failed: ' + e;
    }
    button.disabled = false;
    button.textContent = 'Update Data';
  });

  loadStatus();
</script>
</body>
</html>
"#;
