//! 组件容器的端到端测试工程，测试用例位于 `tests/` 目录。
